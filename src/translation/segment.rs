use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOrigin {
    /// Confirmed by the recognizer; its translation is accumulated.
    Final,
    /// Still changing; its translation is only shown live.
    Interim,
}

/// One recognition event's text, superseded (never mutated) by the next.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationSegment {
    pub text: String,
    pub origin: SegmentOrigin,
    pub dispatched_at: Option<Instant>,
}

impl TranslationSegment {
    /// Normalizes `raw`; returns `None` when nothing is left to translate.
    pub fn new(raw: &str, origin: SegmentOrigin) -> Option<Self> {
        let text = normalize_text(raw);
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text,
            origin,
            dispatched_at: None,
        })
    }
}

/// Strips recognizer timestamp markers and collapses whitespace.
pub fn normalize_text(raw: &str) -> String {
    static TS_RE: OnceLock<Regex> = OnceLock::new();
    let re = TS_RE.get_or_init(|| {
        Regex::new(r"\[\d{2}:\d{2}.*?\]|\(\d{2}:\d{2}\)").expect("valid timestamp regex")
    });
    let stripped = re.replace_all(raw, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
