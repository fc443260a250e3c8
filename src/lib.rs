//! Orchestration core for a multi-provider chat client.
//!
//! Two engines live here: [`poller::JobPoller`] drives asynchronous image and
//! video generation jobs to a terminal state, and
//! [`translation::TranslationSession`] turns live speech recognition events
//! into debounced, deduplicated, single-flight translation calls.
//! [`orchestrator::Orchestrator`] is the facade the UI talks to.

pub mod cancel;
pub mod clock;
pub mod config;
pub mod orchestrator;
pub mod poller;
pub mod provider;
pub mod translation;

pub use cancel::CancellationToken;
pub use clock::Clock;
pub use config::EngineConfig;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use poller::{GenerationJob, JobPoller, JobState, StatusUpdate};
pub use provider::{JobKind, JobParams, ProviderClient, ProviderError, TextStream};
pub use translation::{TranslationSession, TranslationUpdate, TranscriptUpdate};
