use crate::provider::{JobKind, JobParams, JobResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Polling,
    Completed,
    CompletedEmpty,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Submitted | JobState::Polling)
    }
}

/// Why a job stopped without a usable result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("Job not found after {attempts} attempts")]
    NotFound { attempts: u32 },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Status check failed: {0}")]
    Network(String),

    #[error("Timed out after {attempts} attempts")]
    TimedOut { attempts: u32 },
}

/// A single asynchronous generation request tracked by its provider job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: String,
    pub kind: JobKind,
    pub prompt: String,
    pub params: JobParams,
    pub state: JobState,
    pub attempts: u32,
    pub not_found_streak: u32,
    pub result: Option<JobResult>,
    pub last_error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    pub fn new(id: impl Into<String>, kind: JobKind, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            prompt: prompt.into(),
            params: JobParams::default(),
            state: JobState::Submitted,
            attempts: 0,
            not_found_streak: 0,
            result: None,
            last_error: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn with_params(mut self, params: JobParams) -> Self {
        self.params = params;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves the job to `next`. Terminal states are never left or re-entered;
    /// returns false when the transition is refused.
    pub fn transition(&mut self, next: JobState) -> bool {
        if self.state.is_terminal() {
            tracing::warn!(
                "Job {} ignored transition {:?} -> {:?}",
                self.id,
                self.state,
                next
            );
            return false;
        }

        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    pub(crate) fn fail(&mut self, error: PollError) -> bool {
        let next = match error {
            PollError::TimedOut { .. } => JobState::TimedOut,
            _ => JobState::Failed,
        };
        if !self.transition(next) {
            return false;
        }
        self.last_error = Some(error.to_string());
        true
    }
}
