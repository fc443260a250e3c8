use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CachedTranslation {
    text: String,
    output: String,
    attempted_at: Instant,
}

/// Recently successful translations, used to skip repeat requests for the
/// same normalized text inside the cooldown window.
#[derive(Debug, Clone)]
pub struct CooldownCache {
    window: Duration,
    capacity: usize,
    entries: VecDeque<CachedTranslation>,
}

impl CooldownCache {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn lookup(&self, text: &str, now: Instant) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.text == text)
            .filter(|entry| now.saturating_duration_since(entry.attempted_at) < self.window)
            .map(|entry| entry.output.as_str())
    }

    /// Caches `output` for `text`. `attempted_at` is when the translation
    /// was dispatched; the cooldown window is measured from it.
    pub fn record(&mut self, text: &str, output: &str, attempted_at: Instant) {
        self.prune(attempted_at);
        self.entries.retain(|entry| entry.text != text);
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CachedTranslation {
            text: text.to_string(),
            output: output.to_string(),
            attempted_at,
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.entries
            .retain(|entry| now.saturating_duration_since(entry.attempted_at) < window);
    }
}
