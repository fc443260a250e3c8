use super::metrics::Metrics;
use crate::poller::{GenerationJob, PollHandle, StatusSink, StatusUpdate};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Active poll handles keyed by job id, plus a bounded history of finished jobs.
pub(crate) struct JobRegistry {
    active: HashMap<String, PollHandle>,
    finished: VecDeque<GenerationJob>,
    history_limit: usize,
    metrics: Metrics,
}

impl JobRegistry {
    pub(crate) fn new(history_limit: usize) -> Self {
        Self {
            active: HashMap::new(),
            finished: VecDeque::new(),
            history_limit: history_limit.max(1),
            metrics: Metrics::new(),
        }
    }

    pub(crate) fn is_active(&self, job_id: &str) -> bool {
        self.active.contains_key(job_id)
    }

    pub(crate) fn insert(&mut self, handle: PollHandle) {
        self.active.insert(handle.job_id().to_string(), handle);
    }

    pub(crate) fn remove(&mut self, job_id: &str) -> Option<PollHandle> {
        self.active.remove(job_id)
    }

    pub(crate) fn finish(&mut self, job: GenerationJob) {
        self.metrics.record(job.kind, job.state);
        self.finished.retain(|existing| existing.id != job.id);
        self.finished.push_back(job);
        while self.finished.len() > self.history_limit {
            self.finished.pop_front();
        }
    }

    pub(crate) fn job(&self, job_id: &str) -> Option<GenerationJob> {
        if let Some(handle) = self.active.get(job_id) {
            return Some(handle.snapshot());
        }
        self.finished.iter().rev().find(|job| job.id == job_id).cloned()
    }

    pub(crate) fn active_jobs(&self) -> Vec<GenerationJob> {
        let mut jobs: Vec<_> = self.active.values().map(PollHandle::snapshot).collect();
        jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        jobs
    }

    pub(crate) fn finished_jobs(&self) -> Vec<GenerationJob> {
        self.finished.iter().cloned().collect()
    }

    pub(crate) fn drain_active(&mut self) -> Vec<PollHandle> {
        self.active.drain().map(|(_, handle)| handle).collect()
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Status sink installed on every poll task started by the orchestrator.
/// Retires jobs on terminal updates and forwards updates to subscribers.
pub(crate) struct RegistrySink {
    pub(crate) registry: Arc<Mutex<JobRegistry>>,
    pub(crate) events: broadcast::Sender<StatusUpdate>,
}

impl StatusSink for RegistrySink {
    fn on_status(&self, update: StatusUpdate) {
        {
            let Ok(mut registry) = self.registry.lock() else {
                return;
            };

            // Cancelled through the orchestrator; nothing more is reported.
            if !registry.is_active(&update.job_id) {
                tracing::debug!("Dropping update for retired job {}", update.job_id);
                return;
            }

            if update.is_terminal() {
                if let Some(handle) = registry.remove(&update.job_id) {
                    let job = handle.snapshot();
                    registry.finish(job);
                }
            }
        }

        let _ = self.events.send(update);
    }
}
