//! Scripted provider client shared by the integration tests.
//! Fully deterministic: no network, all delays run on paused tokio time.

#![allow(dead_code)]

use async_trait::async_trait;
use genrelay_lib::provider::{
    JobKind, JobParams, ProviderClient, ProviderError, StatusResponse, TextStream,
};
use genrelay_lib::CancellationToken;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct MockClient {
    submit_script: Mutex<VecDeque<Result<String, ProviderError>>>,
    status_scripts: Mutex<HashMap<String, VecDeque<Result<StatusResponse, ProviderError>>>>,
    check_delay: Duration,
    chunk_delay: Duration,
    translate_error: Mutex<Option<ProviderError>>,
    pub submits: AtomicUsize,
    pub checks: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub translations: Mutex<Vec<(String, String)>>,
    pub tokens: Mutex<Vec<CancellationToken>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            submit_script: Mutex::new(VecDeque::new()),
            status_scripts: Mutex::new(HashMap::new()),
            check_delay: Duration::ZERO,
            chunk_delay: Duration::from_millis(10),
            translate_error: Mutex::new(None),
            submits: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            translations: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn with_check_delay(mut self, delay: Duration) -> Self {
        self.check_delay = delay;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn script_submit(&self, result: Result<String, ProviderError>) {
        self.submit_script.lock().unwrap().push_back(result);
    }

    /// Status answers for `job_id`, in order. Once exhausted the job reports
    /// InProgress forever.
    pub fn script_status<I>(&self, job_id: &str, responses: I)
    where
        I: IntoIterator<Item = Result<StatusResponse, ProviderError>>,
    {
        self.status_scripts
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .extend(responses);
    }

    pub fn fail_translations(&self, error: Option<ProviderError>) {
        *self.translate_error.lock().unwrap() = error;
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn translated_texts(&self) -> Vec<String> {
        self.translations
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    async fn submit_job(
        &self,
        _kind: JobKind,
        _prompt: &str,
        _params: &JobParams,
    ) -> Result<String, ProviderError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        self.submit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("job-{}", n + 1)))
    }

    async fn check_job_status(
        &self,
        job_id: &str,
        _kind: JobKind,
    ) -> Result<StatusResponse, ProviderError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.check_delay.is_zero() {
            tokio::time::sleep(self.check_delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.status_scripts
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| Ok(StatusResponse::in_progress()))
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        cancel: CancellationToken,
    ) -> Result<Box<dyn TextStream>, ProviderError> {
        self.translations
            .lock()
            .unwrap()
            .push((text.to_string(), target_language.to_string()));
        self.tokens.lock().unwrap().push(cancel);

        if let Some(error) = self.translate_error.lock().unwrap().clone() {
            return Err(error);
        }

        let chunks = text
            .to_uppercase()
            .split_whitespace()
            .enumerate()
            .map(|(i, word)| {
                if i == 0 {
                    Ok(word.to_string())
                } else {
                    Ok(format!(" {}", word))
                }
            })
            .collect();

        Ok(Box::new(ScriptedStream {
            chunks,
            delay: self.chunk_delay,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct ScriptedStream {
    pub chunks: VecDeque<Result<String, ProviderError>>,
    pub delay: Duration,
}

#[async_trait]
impl TextStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Option<Result<String, ProviderError>> {
        if self.chunks.is_empty() {
            return None;
        }
        tokio::time::sleep(self.delay).await;
        self.chunks.pop_front()
    }
}
