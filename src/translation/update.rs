use super::segment::SegmentOrigin;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Current transcript state, emitted on every speech event and on reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptUpdate {
    /// Confirmed (final) text, in recognition order.
    pub transcript: String,
    /// Text still being recognized.
    pub interim: Option<String>,
}

/// Progress of a translation dispatch, keyed by its correlation id so a UI
/// placeholder never receives another dispatch's partial text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TranslationUpdate {
    #[serde(rename_all = "camelCase")]
    Started {
        dispatch_id: String,
        text: String,
        origin: SegmentOrigin,
    },
    #[serde(rename_all = "camelCase")]
    Delta {
        dispatch_id: String,
        delta: String,
        partial: String,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        dispatch_id: String,
        text: String,
        origin: SegmentOrigin,
        output: String,
        /// Served from the cooldown cache without a provider call.
        reused: bool,
        /// Accumulated translation after this completion.
        translation: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        dispatch_id: String,
        text: String,
        error: String,
    },
    /// Cancellation acknowledgment. Not an error.
    #[serde(rename_all = "camelCase")]
    Superseded { dispatch_id: String },
}

impl TranslationUpdate {
    pub fn dispatch_id(&self) -> &str {
        match self {
            TranslationUpdate::Started { dispatch_id, .. }
            | TranslationUpdate::Delta { dispatch_id, .. }
            | TranslationUpdate::Completed { dispatch_id, .. }
            | TranslationUpdate::Failed { dispatch_id, .. }
            | TranslationUpdate::Superseded { dispatch_id } => dispatch_id,
        }
    }
}

/// Receiver of session callbacks. Called from the session task in order.
pub trait SessionSink: Send + Sync {
    fn on_transcript(&self, update: TranscriptUpdate);
    fn on_translation(&self, update: TranslationUpdate);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Transcript(TranscriptUpdate),
    Translation(TranslationUpdate),
}

impl SessionSink for mpsc::UnboundedSender<SessionEvent> {
    fn on_transcript(&self, update: TranscriptUpdate) {
        let _ = self.send(SessionEvent::Transcript(update));
    }

    fn on_translation(&self, update: TranslationUpdate) {
        let _ = self.send(SessionEvent::Translation(update));
    }
}
