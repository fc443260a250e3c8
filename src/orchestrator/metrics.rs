use crate::poller::JobState;
use crate::provider::JobKind;
use std::collections::HashMap;

/// Terminal outcome counts per job kind.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    outcomes: HashMap<(JobKind, JobState), u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: JobKind, state: JobState) {
        if !state.is_terminal() {
            return;
        }
        *self.outcomes.entry((kind, state)).or_insert(0) += 1;
    }

    pub fn count(&self, kind: JobKind, state: JobState) -> u64 {
        *self.outcomes.get(&(kind, state)).unwrap_or(&0)
    }

    pub fn total(&self, kind: JobKind) -> u64 {
        self.outcomes
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, count)| *count)
            .sum()
    }

    /// Share of finished jobs that produced at least one artifact.
    /// Cancelled jobs are left out.
    pub fn completion_rate(&self, kind: JobKind) -> f32 {
        let completed = self.count(kind, JobState::Completed) as f32;
        let total = (self.total(kind) - self.count(kind, JobState::Cancelled)) as f32;

        if total == 0.0 {
            0.0
        } else {
            completed / total
        }
    }
}
