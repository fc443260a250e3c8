use super::job::{GenerationJob, JobState};
use crate::provider::{JobKind, JobResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

/// Emitted after every status check and on every terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub job_id: String,
    pub kind: JobKind,
    pub prompt: String,
    pub state: JobState,
    pub attempts: u32,
    pub message: String,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn from_job(job: &GenerationJob, message: impl Into<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind,
            prompt: job.prompt.clone(),
            state: job.state,
            attempts: job.attempts,
            message: message.into(),
            result: job.result.clone(),
            error: job.last_error.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Receiver of job status updates.
///
/// Called from the poll task; implementations must not block for long and
/// must not cancel the job that is reporting.
pub trait StatusSink: Send + Sync {
    fn on_status(&self, update: StatusUpdate);
}

impl StatusSink for mpsc::UnboundedSender<StatusUpdate> {
    fn on_status(&self, update: StatusUpdate) {
        let _ = self.send(update);
    }
}

impl StatusSink for broadcast::Sender<StatusUpdate> {
    fn on_status(&self, update: StatusUpdate) {
        // No subscribers is not an error.
        let _ = self.send(update);
    }
}
