// src/provider/types.rs
// Provider-neutral job and status types plus error classification

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of asynchronous generation job. Selects the polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Image,
    Video,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Image => f.write_str("image"),
            JobKind::Video => f.write_str("video"),
        }
    }
}

/// Request parameters forwarded to the provider on submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParams {
    pub model: Option<String>,
    pub aspect_ratio: Option<String>,
    pub duration_secs: Option<u32>,
    /// Set for image edits: the image the prompt applies to.
    pub source_image_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Artifacts produced by a completed job (image URLs or a video URL).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub urls: Vec<String>,
}

impl JobResult {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    pub fn is_empty(&self) -> bool {
        self.urls.iter().all(|url| url.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Completed,
    InProgress,
    InQueue,
    NotFound,
    Error,
    Unknown(String),
}

impl ProviderStatus {
    /// Maps a raw queue status string as returned by generation providers.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "COMPLETED" | "SUCCEEDED" | "OK" => ProviderStatus::Completed,
            "IN_PROGRESS" | "PROCESSING" | "RUNNING" => ProviderStatus::InProgress,
            "IN_QUEUE" | "QUEUED" | "PENDING" => ProviderStatus::InQueue,
            "NOT_FOUND" => ProviderStatus::NotFound,
            "ERROR" | "FAILED" => ProviderStatus::Error,
            _ => ProviderStatus::Unknown(raw.trim().to_string()),
        }
    }
}

/// Answer to a single `check_job_status` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ProviderStatus,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub queue_position: Option<u32>,
}

impl StatusResponse {
    pub fn new(status: ProviderStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
            queue_position: None,
        }
    }

    pub fn completed(result: JobResult) -> Self {
        Self {
            result: Some(result),
            ..Self::new(ProviderStatus::Completed)
        }
    }

    pub fn in_progress() -> Self {
        Self::new(ProviderStatus::InProgress)
    }

    pub fn in_queue(position: Option<u32>) -> Self {
        Self {
            queue_position: position,
            ..Self::new(ProviderStatus::InQueue)
        }
    }

    pub fn not_found() -> Self {
        Self::new(ProviderStatus::NotFound)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(ProviderStatus::Error)
        }
    }
}

/// Provider error types with retry classification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Authentication failed")]
    Authentication,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// True when the request was rejected before reaching the provider's job
    /// queue, so resubmitting cannot create a duplicate job.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Network(_) | ProviderError::RateLimited)
    }
}
