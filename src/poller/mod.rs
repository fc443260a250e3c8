// src/poller/mod.rs
// Drives generation jobs from submission to a terminal state

mod budget;
mod job;
mod update;

pub use budget::PollBudget;
pub use job::{GenerationJob, JobState, PollError};
pub use update::{StatusSink, StatusUpdate};

use crate::cancel::CancellationToken;
use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::provider::{JobKind, ProviderClient, ProviderError, ProviderStatus, StatusResponse};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawns one poll task per job. Each task issues strictly serial status
/// checks: the next check is scheduled only after the previous one returned.
pub struct JobPoller {
    client: Arc<dyn ProviderClient>,
    clock: Clock,
    image: PollBudget,
    video: PollBudget,
}

impl JobPoller {
    /// Fails when a budget in `config` would make polling impossible (zero
    /// interval or zero attempts).
    pub fn new(
        client: Arc<dyn ProviderClient>,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            client,
            clock: Clock::new(),
            image: config.image,
            video: config.video,
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn budget(&self, kind: JobKind) -> PollBudget {
        match kind {
            JobKind::Image => self.image,
            JobKind::Video => self.video,
        }
    }

    /// Starts polling `job`. Must be called inside a tokio runtime.
    pub fn start(&self, job: GenerationJob, sink: Arc<dyn StatusSink>) -> PollHandle {
        let budget = self.budget(job.kind);
        let token = CancellationToken::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(job.clone());
        let shared = Arc::new(Shared {
            closed: Mutex::new(false),
            snapshot: snapshot_tx,
        });

        tracing::info!(
            "Polling {} job {} every {}ms (max {} attempts, {} not-found)",
            job.kind,
            job.id,
            budget.interval_ms,
            budget.max_attempts,
            budget.max_not_found
        );

        let job_id = job.id.clone();
        let kind = job.kind;
        let task = tokio::spawn(run(
            self.client.clone(),
            self.clock,
            budget,
            job,
            token.clone(),
            shared.clone(),
            sink,
        ));

        PollHandle {
            job_id,
            kind,
            token,
            shared,
            snapshot: snapshot_rx,
            task,
        }
    }
}

/// Handle to a running poll task.
///
/// Dropping the handle detaches the task; it still stops at its budget.
pub struct PollHandle {
    job_id: String,
    kind: JobKind,
    token: CancellationToken,
    shared: Arc<Shared>,
    snapshot: watch::Receiver<GenerationJob>,
    task: JoinHandle<GenerationJob>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Latest published state of the job.
    pub fn snapshot(&self) -> GenerationJob {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationJob> {
        self.snapshot.clone()
    }

    /// Stops polling. No StatusUpdate is emitted after this returns.
    /// Returns false if the job had already reached a terminal state.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.cancel();
        self.token.cancel();
        if cancelled {
            tracing::info!("Job {} cancelled", self.job_id);
        }
        cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the poll task and returns the job in its final state.
    pub async fn join(self) -> GenerationJob {
        match self.task.await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!("Poll task for job {} aborted: {}", self.job_id, e);
                self.snapshot.borrow().clone()
            }
        }
    }
}

// Serializes snapshot publication and sink delivery against cancellation.
struct Shared {
    closed: Mutex<bool>,
    snapshot: watch::Sender<GenerationJob>,
}

impl Shared {
    /// Publishes `job` and delivers `update`, unless the job was cancelled or
    /// already reported terminal. Closes itself after a terminal publish.
    fn publish(
        &self,
        job: &GenerationJob,
        sink: &dyn StatusSink,
        update: Option<StatusUpdate>,
    ) -> bool {
        let mut closed = match self.closed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *closed {
            return false;
        }

        self.snapshot.send_replace(job.clone());
        if let Some(update) = update {
            sink.on_status(update);
        }
        if job.is_terminal() {
            *closed = true;
        }
        true
    }

    fn cancel(&self) -> bool {
        let mut closed = match self.closed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *closed {
            return false;
        }

        *closed = true;
        self.snapshot.send_modify(|job| {
            job.transition(JobState::Cancelled);
        });
        true
    }
}

async fn run(
    client: Arc<dyn ProviderClient>,
    clock: Clock,
    budget: PollBudget,
    mut job: GenerationJob,
    token: CancellationToken,
    shared: Arc<Shared>,
    sink: Arc<dyn StatusSink>,
) -> GenerationJob {
    job.transition(JobState::Polling);
    if !shared.publish(&job, sink.as_ref(), None) {
        return cancelled(job);
    }

    let mut ticker = clock.every(budget.interval());
    let stop = ticker.stop_handle();
    token.on_cancel(move || stop.cancel());

    loop {
        if ticker.tick().await.is_none() {
            return cancelled(job);
        }

        job.attempts += 1;
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            response = client.check_job_status(&job.id, job.kind) => Some(response),
        };

        // A check can resolve in the same instant the job is cancelled; its
        // result must not be applied.
        let response = match response {
            Some(response) if !token.is_cancelled() => response,
            _ => return cancelled(job),
        };

        let mut next = job.clone();
        let mut message = apply_response(&mut next, &budget, response);
        // The last permitted check reports the timeout itself, so attempts
        // stay strictly increasing across updates.
        if !next.is_terminal() && next.attempts >= budget.max_attempts {
            let error = PollError::TimedOut {
                attempts: next.attempts,
            };
            message = error.to_string();
            next.fail(error);
        }
        let update = StatusUpdate::from_job(&next, message);
        if !shared.publish(&next, sink.as_ref(), Some(update)) {
            return cancelled(job);
        }
        job = next;

        if job.is_terminal() {
            match job.state {
                JobState::Completed | JobState::CompletedEmpty => tracing::info!(
                    "Job {} finished {:?} after {} attempts",
                    job.id,
                    job.state,
                    job.attempts
                ),
                _ => tracing::warn!(
                    "Job {} finished {:?} after {} attempts: {}",
                    job.id,
                    job.state,
                    job.attempts,
                    job.last_error.as_deref().unwrap_or("no error")
                ),
            }
            ticker.stop();
            return job;
        }
    }
}

fn cancelled(mut job: GenerationJob) -> GenerationJob {
    job.transition(JobState::Cancelled);
    tracing::debug!("Poll task for job {} stopped by cancellation", job.id);
    job
}

/// Applies one status check to the job and returns the human status line.
fn apply_response(
    job: &mut GenerationJob,
    budget: &PollBudget,
    response: Result<StatusResponse, ProviderError>,
) -> String {
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            // Only NotFound is retried; a failed check is terminal.
            let error = PollError::Network(e.to_string());
            let message = error.to_string();
            job.fail(error);
            return message;
        }
    };

    if response.status != ProviderStatus::NotFound {
        job.not_found_streak = 0;
    }

    match response.status {
        ProviderStatus::Completed => match response.result {
            Some(result) if !result.is_empty() => {
                let count = result.urls.len();
                job.result = Some(result);
                job.transition(JobState::Completed);
                format!("Completed with {} result(s)", count)
            }
            _ => {
                job.transition(JobState::CompletedEmpty);
                "Completed without results".to_string()
            }
        },
        ProviderStatus::InProgress => format!(
            "In progress (attempt {}/{})",
            job.attempts, budget.max_attempts
        ),
        ProviderStatus::InQueue => match response.queue_position {
            Some(position) => format!(
                "In queue at position {} (attempt {}/{})",
                position, job.attempts, budget.max_attempts
            ),
            None => format!("In queue (attempt {}/{})", job.attempts, budget.max_attempts),
        },
        ProviderStatus::NotFound => {
            job.not_found_streak += 1;
            if job.not_found_streak > budget.max_not_found {
                let error = PollError::NotFound {
                    attempts: job.attempts,
                };
                let message = error.to_string();
                job.fail(error);
                message
            } else {
                format!(
                    "Waiting for job to appear ({}/{})",
                    job.not_found_streak, budget.max_not_found
                )
            }
        }
        ProviderStatus::Error => {
            let error = PollError::Provider(
                response
                    .error
                    .unwrap_or_else(|| "Provider reported an error".to_string()),
            );
            let message = error.to_string();
            job.fail(error);
            message
        }
        ProviderStatus::Unknown(raw) => {
            let error = PollError::Provider(format!("Unexpected status '{}'", raw));
            let message = error.to_string();
            job.fail(error);
            message
        }
    }
}
