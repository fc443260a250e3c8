// src/translation/mod.rs
// Live transcription buffering and single-flight translation dispatch

mod cooldown;
mod segment;
mod update;

pub use cooldown::CooldownCache;
pub use segment::{normalize_text, SegmentOrigin, TranslationSegment};
pub use update::{SessionEvent, SessionSink, TranscriptUpdate, TranslationUpdate};

use crate::cancel::CancellationToken;
use crate::clock::{Clock, Timer};
use crate::config::TranslationConfig;
use crate::provider::{ProviderClient, ProviderError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("Translation stream failed: {0}")]
    Stream(String),

    #[error("Translation aborted")]
    Aborted,
}

impl From<ProviderError> for TranslationError {
    fn from(e: ProviderError) -> Self {
        TranslationError::Stream(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Debouncing,
    Translating,
}

/// Published view of a session, refreshed after every processed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub transcript: String,
    pub translation: String,
    pub pending_interim: Option<String>,
    /// Partial output of the in-flight dispatch, or the last interim result.
    pub live_translation: Option<String>,
    pub active_dispatch: Option<String>,
    pub target_language: String,
}

impl SessionSnapshot {
    fn empty(target_language: &str) -> Self {
        Self {
            phase: SessionPhase::Idle,
            transcript: String::new(),
            translation: String::new(),
            pending_interim: None,
            live_translation: None,
            active_dispatch: None,
            target_language: target_language.to_string(),
        }
    }
}

enum Command {
    Interim(String),
    Final(String),
    RecognitionEnded,
    Reset,
    SetTargetLanguage(String),
    Flush(oneshot::Sender<()>),
    Shutdown,
    DebounceFired {
        seq: u64,
    },
    Chunk {
        dispatch_id: String,
        delta: String,
    },
    Finished {
        dispatch_id: String,
        outcome: Result<(), ProviderError>,
    },
}

/// Handle to a translation session task.
///
/// All speech events are processed in order by a single task that owns the
/// buffers, the debounce timer and the in-flight dispatch. Dropping the
/// handle shuts the task down and cancels any in-flight translation.
pub struct TranslationSession {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl TranslationSession {
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        client: Arc<dyn ProviderClient>,
        config: TranslationConfig,
        sink: Arc<dyn SessionSink>,
    ) -> Self {
        Self::spawn_with_clock(client, Clock::new(), config, sink)
    }

    pub fn spawn_with_clock(
        client: Arc<dyn ProviderClient>,
        clock: Clock,
        config: TranslationConfig,
        sink: Arc<dyn SessionSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) =
            watch::channel(SessionSnapshot::empty(&config.target_language));

        let worker = SessionWorker {
            client,
            clock,
            cooldown: CooldownCache::new(config.cooldown(), config.cooldown_capacity),
            config,
            sink,
            commands: tx.clone(),
            snapshot: snapshot_tx,
            transcript: String::new(),
            translation: String::new(),
            pending_interim: None,
            interim_translation: None,
            debounce: None,
            debounce_seq: 0,
            active: None,
        };
        let task = tokio::spawn(worker.run(rx));

        Self {
            commands: tx,
            snapshot: snapshot_rx,
            task: Some(task),
        }
    }

    pub fn on_interim_result(&self, text: &str) {
        self.send(Command::Interim(text.to_string()));
    }

    pub fn on_final_result(&self, text: &str) {
        self.send(Command::Final(text.to_string()));
    }

    pub fn on_recognition_ended(&self) {
        self.send(Command::RecognitionEnded);
    }

    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    /// Mode change: resets the session and translates into `language` from now on.
    pub fn set_target_language(&self, language: &str) {
        self.send(Command::SetTargetLanguage(language.trim().to_string()));
    }

    /// Resolves once every command sent before it has been processed.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Flush(ack_tx));
        let _ = ack_rx.await;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub async fn shutdown(mut self) {
        self.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Translation session is shut down; event dropped");
        }
    }
}

impl Drop for TranslationSession {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

struct ActiveDispatch {
    id: String,
    segment: TranslationSegment,
    token: CancellationToken,
    partial: String,
    /// Final segments waiting on this output; each appends it once.
    confirmations: u32,
}

struct SessionWorker {
    client: Arc<dyn ProviderClient>,
    clock: Clock,
    config: TranslationConfig,
    sink: Arc<dyn SessionSink>,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Sender<SessionSnapshot>,
    transcript: String,
    translation: String,
    pending_interim: Option<TranslationSegment>,
    interim_translation: Option<String>,
    debounce: Option<Timer>,
    debounce_seq: u64,
    active: Option<ActiveDispatch>,
    cooldown: CooldownCache,
}

impl SessionWorker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::info!(
            "Translation session started (target={}, debounce={}ms, cooldown={}ms)",
            self.config.target_language,
            self.config.debounce_ms,
            self.config.cooldown_ms
        );

        while let Some(command) = commands.recv().await {
            match command {
                Command::Interim(text) => self.on_interim(&text),
                Command::Final(text) => self.on_final(&text),
                Command::RecognitionEnded => self.on_recognition_ended(),
                Command::Reset => self.reset(),
                Command::SetTargetLanguage(language) => self.set_target_language(language),
                Command::Flush(ack) => {
                    let _ = ack.send(());
                }
                Command::Shutdown => {
                    self.cancel_active();
                    self.cancel_debounce();
                    break;
                }
                Command::DebounceFired { seq } => self.on_debounce_fired(seq),
                Command::Chunk { dispatch_id, delta } => self.on_chunk(&dispatch_id, delta),
                Command::Finished {
                    dispatch_id,
                    outcome,
                } => self.on_finished(&dispatch_id, outcome),
            }
            self.publish();
        }

        tracing::info!("Translation session stopped");
    }

    fn on_interim(&mut self, raw: &str) {
        let Some(segment) = TranslationSegment::new(raw, SegmentOrigin::Interim) else {
            return;
        };

        self.pending_interim = Some(segment);
        self.arm_debounce();
        self.emit_transcript();
    }

    fn on_final(&mut self, raw: &str) {
        self.cancel_debounce();
        self.pending_interim = None;

        let Some(segment) = TranslationSegment::new(raw, SegmentOrigin::Final) else {
            self.emit_transcript();
            return;
        };

        append_text(&mut self.transcript, &segment.text);
        self.interim_translation = None;
        self.emit_transcript();
        self.dispatch(segment);
    }

    fn on_recognition_ended(&mut self) {
        match self.pending_interim.take() {
            Some(segment) => {
                tracing::debug!("Recognition ended with pending interim; finalizing it");
                self.on_final(&segment.text);
            }
            None => self.cancel_debounce(),
        }
    }

    fn on_debounce_fired(&mut self, seq: u64) {
        if seq != self.debounce_seq {
            tracing::debug!("Ignoring superseded debounce fire {}", seq);
            return;
        }
        self.debounce = None;

        if let Some(segment) = self.pending_interim.clone() {
            tracing::debug!("Debounce elapsed for interim '{}'", segment.text);
            self.dispatch(segment);
        }
    }

    fn arm_debounce(&mut self) {
        self.cancel_debounce();
        let seq = self.debounce_seq;
        let commands = self.commands.clone();
        self.debounce = Some(self.clock.after(self.config.debounce(), move || {
            let _ = commands.send(Command::DebounceFired { seq });
        }));
    }

    fn cancel_debounce(&mut self) {
        // Bumping the sequence also invalidates a fire already queued.
        self.debounce_seq += 1;
        if let Some(timer) = self.debounce.take() {
            timer.cancel();
        }
    }

    fn dispatch(&mut self, mut segment: TranslationSegment) {
        let now = self.clock.now();

        if let Some(active) = self.active.as_mut() {
            if active.segment.text == segment.text {
                if segment.origin == SegmentOrigin::Final {
                    active.segment.origin = SegmentOrigin::Final;
                    active.confirmations += 1;
                }
                tracing::debug!("Translation for '{}' already in flight", segment.text);
                return;
            }
        }

        // Whatever is in flight is for other text and is stale from here on,
        // whether this segment is served from the cache or dispatched.
        self.cancel_active();

        if let Some(output) = self.cooldown.lookup(&segment.text, now) {
            let output = output.to_string();
            tracing::info!("Reusing cached translation for '{}'", segment.text);
            self.complete(
                Uuid::new_v4().to_string(),
                segment.text,
                segment.origin,
                output,
                1,
                true,
            );
            return;
        }

        segment.dispatched_at = Some(now);
        let dispatch_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let confirmations = match segment.origin {
            SegmentOrigin::Final => 1,
            SegmentOrigin::Interim => 0,
        };

        tracing::info!(
            "Dispatching {:?} translation {} ({} chars)",
            segment.origin,
            dispatch_id,
            segment.text.len()
        );
        self.sink.on_translation(TranslationUpdate::Started {
            dispatch_id: dispatch_id.clone(),
            text: segment.text.clone(),
            origin: segment.origin,
        });

        tokio::spawn(stream_translation(
            self.client.clone(),
            segment.text.clone(),
            self.config.target_language.clone(),
            token.clone(),
            dispatch_id.clone(),
            self.commands.clone(),
        ));

        self.active = Some(ActiveDispatch {
            id: dispatch_id,
            segment,
            token,
            partial: String::new(),
            confirmations,
        });
    }

    fn on_chunk(&mut self, dispatch_id: &str, delta: String) {
        let Some(active) = self.active.as_mut() else {
            tracing::debug!("Dropping chunk for inactive dispatch {}", dispatch_id);
            return;
        };
        if active.id != dispatch_id || active.token.is_cancelled() {
            tracing::debug!("Dropping chunk for superseded dispatch {}", dispatch_id);
            return;
        }

        active.partial.push_str(&delta);
        self.sink.on_translation(TranslationUpdate::Delta {
            dispatch_id: active.id.clone(),
            delta,
            partial: active.partial.clone(),
        });
    }

    fn on_finished(&mut self, dispatch_id: &str, outcome: Result<(), ProviderError>) {
        let is_current = self
            .active
            .as_ref()
            .map_or(false, |active| active.id == dispatch_id && !active.token.is_cancelled());
        if !is_current {
            tracing::debug!("Ignoring completion of superseded dispatch {}", dispatch_id);
            return;
        }
        let Some(active) = self.active.take() else {
            return;
        };

        match outcome {
            Ok(()) => {
                let output = active.partial.trim().to_string();
                // The window runs from the attempt, not from stream completion.
                let dispatched_at = active
                    .segment
                    .dispatched_at
                    .unwrap_or_else(|| self.clock.now());
                self.cooldown
                    .record(&active.segment.text, &output, dispatched_at);
                self.complete(
                    active.id,
                    active.segment.text,
                    active.segment.origin,
                    output,
                    active.confirmations,
                    false,
                );
            }
            Err(e) => {
                let error = TranslationError::from(e);
                tracing::warn!("Translation {} failed: {}", active.id, error);
                self.sink.on_translation(TranslationUpdate::Failed {
                    dispatch_id: active.id,
                    text: active.segment.text,
                    error: error.to_string(),
                });
            }
        }
    }

    fn complete(
        &mut self,
        dispatch_id: String,
        text: String,
        origin: SegmentOrigin,
        output: String,
        confirmations: u32,
        reused: bool,
    ) {
        match origin {
            SegmentOrigin::Final => {
                for _ in 0..confirmations {
                    append_text(&mut self.translation, &output);
                }
                self.interim_translation = None;
            }
            SegmentOrigin::Interim => {
                self.interim_translation = Some(output.clone()).filter(|o| !o.is_empty());
            }
        }

        self.sink.on_translation(TranslationUpdate::Completed {
            dispatch_id,
            text,
            origin,
            output,
            reused,
            translation: self.translation.clone(),
        });
    }

    fn cancel_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            tracing::info!("Translation {} superseded: {}", active.id, TranslationError::Aborted);
            self.sink
                .on_translation(TranslationUpdate::Superseded { dispatch_id: active.id });
        }
    }

    fn reset(&mut self) {
        // Cancel before clearing so a still-running call cannot write into
        // the fresh buffers.
        self.cancel_active();
        self.cancel_debounce();
        self.transcript.clear();
        self.translation.clear();
        self.pending_interim = None;
        self.interim_translation = None;
        self.cooldown.clear();
        self.emit_transcript();
        tracing::info!("Translation session reset");
    }

    fn set_target_language(&mut self, language: String) {
        if language.is_empty() {
            tracing::warn!("Ignoring empty target language");
            return;
        }
        self.reset();
        tracing::info!(
            "Target language changed {} -> {}",
            self.config.target_language,
            language
        );
        self.config.target_language = language;
    }

    fn emit_transcript(&self) {
        self.sink.on_transcript(TranscriptUpdate {
            transcript: self.transcript.clone(),
            interim: self.pending_interim.as_ref().map(|s| s.text.clone()),
        });
    }

    fn publish(&self) {
        let phase = if self.active.is_some() {
            SessionPhase::Translating
        } else if self.debounce.as_ref().map_or(false, Timer::is_pending) {
            SessionPhase::Debouncing
        } else {
            SessionPhase::Idle
        };

        let live_translation = match self.active.as_ref() {
            Some(active) if !active.partial.is_empty() => Some(active.partial.clone()),
            _ => self.interim_translation.clone(),
        };

        self.snapshot.send_replace(SessionSnapshot {
            phase,
            transcript: self.transcript.clone(),
            translation: self.translation.clone(),
            pending_interim: self.pending_interim.as_ref().map(|s| s.text.clone()),
            live_translation,
            active_dispatch: self.active.as_ref().map(|a| a.id.clone()),
            target_language: self.config.target_language.clone(),
        });
    }
}

fn append_text(log: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !log.is_empty() {
        log.push(' ');
    }
    log.push_str(text);
}

/// Relays one translation stream into the session task. Stops forwarding as
/// soon as `token` is cancelled.
async fn stream_translation(
    client: Arc<dyn ProviderClient>,
    text: String,
    target_language: String,
    token: CancellationToken,
    dispatch_id: String,
    commands: mpsc::UnboundedSender<Command>,
) {
    let started = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        started = client.translate(&text, &target_language, token.clone()) => started,
    };

    let mut stream = match started {
        Ok(stream) => stream,
        Err(e) => {
            if !token.is_cancelled() {
                let _ = commands.send(Command::Finished {
                    dispatch_id,
                    outcome: Err(e),
                });
            }
            return;
        }
    };

    loop {
        let chunk = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            chunk = stream.next_chunk() => chunk,
        };
        if token.is_cancelled() {
            return;
        }

        match chunk {
            Some(Ok(delta)) => {
                if delta.is_empty() {
                    continue;
                }
                let _ = commands.send(Command::Chunk {
                    dispatch_id: dispatch_id.clone(),
                    delta,
                });
            }
            Some(Err(e)) => {
                let _ = commands.send(Command::Finished {
                    dispatch_id,
                    outcome: Err(e),
                });
                return;
            }
            None => {
                let _ = commands.send(Command::Finished {
                    dispatch_id,
                    outcome: Ok(()),
                });
                return;
            }
        }
    }
}
