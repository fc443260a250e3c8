use crate::config::{ConfigError, EngineConfig};
use crate::poller::{GenerationJob, JobPoller, JobState, StatusUpdate};
use crate::provider::{JobKind, JobParams, ProviderClient, ProviderError};
use crate::translation::{
    SessionSink, SessionSnapshot, TranscriptUpdate, TranslationSession, TranslationUpdate,
};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use self::metrics::Metrics;
use self::registry::{JobRegistry, RegistrySink};
use self::retry::RetryPolicy;

pub mod metrics;
mod registry;
pub mod retry;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Job submission failed: {0}")]
    Submit(ProviderError),

    #[error("Job {0} is already being polled")]
    DuplicateJob(String),
}

/// Surface the chat UI talks to: starts and cancels generation jobs, feeds
/// speech events into the translation session, and publishes their updates.
///
/// Jobs and the session are owned by their own tasks; the orchestrator only
/// reads published snapshots and relays callbacks.
pub struct Orchestrator {
    client: Arc<dyn ProviderClient>,
    config: EngineConfig,
    poller: JobPoller,
    registry: Arc<Mutex<JobRegistry>>,
    status_tx: broadcast::Sender<StatusUpdate>,
    transcript_tx: broadcast::Sender<TranscriptUpdate>,
    translation_tx: broadcast::Sender<TranslationUpdate>,
    session: TranslationSession,
}

impl Orchestrator {
    /// Must be called inside a tokio runtime. Rejects configs that fail
    /// `EngineConfig::validate`.
    pub fn new(
        client: Arc<dyn ProviderClient>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        let poller = JobPoller::new(client.clone(), &config)?;
        let (status_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (transcript_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (translation_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let session = TranslationSession::spawn(
            client.clone(),
            config.translation.clone(),
            Arc::new(BroadcastSessionSink {
                transcript: transcript_tx.clone(),
                translation: translation_tx.clone(),
            }),
        );

        tracing::info!(
            "Orchestrator ready: provider={}, target_language={}",
            client.name(),
            config.translation.target_language
        );

        Ok(Self {
            poller,
            registry: Arc::new(Mutex::new(JobRegistry::new(config.history_limit))),
            client,
            config,
            status_tx,
            transcript_tx,
            translation_tx,
            session,
        })
    }

    pub fn from_env(client: Arc<dyn ProviderClient>) -> Result<Self, ConfigError> {
        let config = EngineConfig::from_env()?;
        Self::new(client, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submits a generation request and starts polling it. Returns the
    /// provider job id; progress arrives on `subscribe_status()`.
    pub async fn start_generation_job(
        &self,
        kind: JobKind,
        prompt: &str,
        params: JobParams,
    ) -> Result<String, OrchestratorError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(OrchestratorError::EmptyPrompt);
        }

        let job_id = self.submit_with_retry(kind, prompt, &params).await?;
        let job = GenerationJob::new(job_id.clone(), kind, prompt).with_params(params);
        let sink = Arc::new(RegistrySink {
            registry: self.registry.clone(),
            events: self.status_tx.clone(),
        });

        // Held across start + insert so the task's first update finds its entry.
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if registry.is_active(&job_id) {
            tracing::warn!("Provider returned job id {} which is already active", job_id);
            return Err(OrchestratorError::DuplicateJob(job_id));
        }
        registry.insert(self.poller.start(job, sink));

        tracing::info!("Started {} job {}", kind, job_id);
        Ok(job_id)
    }

    /// Stops polling `job_id`. Returns false when the job is unknown or had
    /// already finished.
    pub fn cancel_generation_job(&self, job_id: &str) -> bool {
        let handle = match self.registry.lock() {
            Ok(mut registry) => registry.remove(job_id),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            tracing::debug!("Cancel requested for inactive job {}", job_id);
            return false;
        };

        // Cancelled outside the registry lock: the poll task may be holding
        // its publish lock while waiting on the registry.
        let cancelled = handle.cancel();
        let job = handle.snapshot();
        if let Ok(mut registry) = self.registry.lock() {
            registry.finish(job.clone());
        }

        // The job finished while we were removing it. Its terminal update was
        // dropped by the registry sink, so report it here.
        if !cancelled && job.is_terminal() && job.state != JobState::Cancelled {
            tracing::debug!("Job {} finished before cancel; reporting {:?}", job.id, job.state);
            let _ = self
                .status_tx
                .send(StatusUpdate::from_job(&job, terminal_message(&job)));
        }
        cancelled
    }

    /// Current snapshot of an active or recently finished job.
    pub fn job(&self, job_id: &str) -> Option<GenerationJob> {
        self.registry.lock().ok()?.job(job_id)
    }

    pub fn active_jobs(&self) -> Vec<GenerationJob> {
        self.registry
            .lock()
            .map(|registry| registry.active_jobs())
            .unwrap_or_default()
    }

    pub fn finished_jobs(&self) -> Vec<GenerationJob> {
        self.registry
            .lock()
            .map(|registry| registry.finished_jobs())
            .unwrap_or_default()
    }

    pub fn metrics(&self) -> Metrics {
        self.registry
            .lock()
            .map(|registry| registry.metrics().clone())
            .unwrap_or_default()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status_tx.subscribe()
    }

    pub fn feed_interim_speech(&self, text: &str) {
        self.session.on_interim_result(text);
    }

    pub fn feed_final_speech(&self, text: &str) {
        self.session.on_final_result(text);
    }

    pub fn end_speech_session(&self) {
        self.session.on_recognition_ended();
    }

    pub fn reset_translation_session(&self) {
        self.session.reset();
    }

    pub fn set_target_language(&self, language: &str) {
        self.session.set_target_language(language);
    }

    pub fn translation_state(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Resolves once every speech event fed so far has been processed.
    pub async fn flush_translation(&self) {
        self.session.flush().await;
    }

    pub fn subscribe_transcript(&self) -> broadcast::Receiver<TranscriptUpdate> {
        self.transcript_tx.subscribe()
    }

    pub fn subscribe_translation(&self) -> broadcast::Receiver<TranslationUpdate> {
        self.translation_tx.subscribe()
    }

    /// Cancels every active job and stops the translation session.
    pub async fn shutdown(self) {
        let handles = match self.registry.lock() {
            Ok(mut registry) => registry.drain_active(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            handle.cancel();
            let job = handle.join().await;
            if let Ok(mut registry) = self.registry.lock() {
                registry.finish(job);
            }
        }

        self.session.shutdown().await;
        tracing::info!("Orchestrator shut down");
    }

    async fn submit_with_retry(
        &self,
        kind: JobKind,
        prompt: &str,
        params: &JobParams,
    ) -> Result<String, OrchestratorError> {
        let retry_policy = RetryPolicy::new(self.config.submit_max_retries);
        let mut attempt = 0u8;

        loop {
            match self.client.submit_job(kind, prompt, params).await {
                Ok(job_id) if job_id.trim().is_empty() => {
                    return Err(OrchestratorError::Submit(ProviderError::InvalidResponse(
                        "empty job id".to_string(),
                    )));
                }
                Ok(job_id) => return Ok(job_id.trim().to_string()),
                Err(e) => {
                    tracing::warn!(
                        "Submitting {} job to {} failed (attempt {}/{}): {}",
                        kind,
                        self.client.name(),
                        attempt as u32 + 1,
                        self.config.submit_max_retries as u32 + 1,
                        e
                    );

                    if retry_policy.should_retry(attempt, &e) {
                        retry_policy.wait_before_retry(attempt).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(OrchestratorError::Submit(e));
                }
            }
        }
    }
}

fn terminal_message(job: &GenerationJob) -> String {
    match job.state {
        JobState::Completed => format!(
            "Completed with {} result(s)",
            job.result.as_ref().map_or(0, |result| result.urls.len())
        ),
        JobState::CompletedEmpty => "Completed without results".to_string(),
        _ => job
            .last_error
            .clone()
            .unwrap_or_else(|| format!("{:?}", job.state)),
    }
}

struct BroadcastSessionSink {
    transcript: broadcast::Sender<TranscriptUpdate>,
    translation: broadcast::Sender<TranslationUpdate>,
}

impl SessionSink for BroadcastSessionSink {
    fn on_transcript(&self, update: TranscriptUpdate) {
        let _ = self.transcript.send(update);
    }

    fn on_translation(&self, update: TranslationUpdate) {
        let _ = self.translation.send(update);
    }
}
