use crate::provider::JobKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing budget for polling one job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBudget {
    pub interval_ms: u64,
    /// Upper bound on status checks issued for one job.
    pub max_attempts: u32,
    /// Consecutive NotFound answers tolerated; one more fails the job.
    pub max_not_found: u32,
}

impl PollBudget {
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::Image => Self {
                interval_ms: 3_000,
                max_attempts: 30,
                max_not_found: 12,
            },
            JobKind::Video => Self {
                interval_ms: 5_000,
                max_attempts: 60,
                max_not_found: 15,
            },
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
