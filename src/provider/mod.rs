// src/provider/mod.rs
// Provider client contract consumed by the poller and the translation session

mod types;

pub use types::{JobKind, JobParams, JobResult, ProviderError, ProviderStatus, StatusResponse};

use crate::cancel::CancellationToken;
use async_trait::async_trait;

/// Incremental text output of a streaming call, chunk by chunk.
#[async_trait]
pub trait TextStream: Send {
    /// Next text delta. `None` when the stream is complete.
    async fn next_chunk(&mut self) -> Option<Result<String, ProviderError>>;
}

/// Unified client for the AI providers behind the chat UI.
///
/// Implemented outside this crate (HTTP transport, auth and request
/// formatting live with the embedding application).
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Submit an asynchronous generation request. Returns the provider job id.
    async fn submit_job(
        &self,
        kind: JobKind,
        prompt: &str,
        params: &JobParams,
    ) -> Result<String, ProviderError>;

    /// Query the status of a previously submitted job.
    async fn check_job_status(
        &self,
        job_id: &str,
        kind: JobKind,
    ) -> Result<StatusResponse, ProviderError>;

    /// Start a streaming translation of `text` into `target_language`.
    /// Implementations should stop producing output once `cancel` fires.
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        cancel: CancellationToken,
    ) -> Result<Box<dyn TextStream>, ProviderError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
