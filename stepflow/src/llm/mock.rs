//! Mock LLM for tests and examples.
//!
//! Returns scripted answers in order, records every prompt it receives, and can be made
//! unavailable to exercise the no-backend paths.
//!
//! # Streaming Support
//!
//! When `on_token` is set, the answer is sent as a single chunk by default; enable
//! `stream_by_char` to send one chunk per character.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::FlowError;

use super::{prompt_with_payload, BackendInfo, BackendKind, GenerateOptions, LlmBackend, TokenChunk};

/// Mock LLM: scripted answers, recorded prompts.
///
/// **Interaction**: Implements `LlmBackend`; injected through `resolve_backend` or
/// `WorkflowDeps` in tests.
pub struct MockLlm {
    /// Scripted answers; `Err` entries make that call fail.
    responses: Mutex<VecDeque<Result<String, String>>>,
    /// Returned once the script is exhausted; `None` makes further calls fail.
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    available: bool,
    stream_by_char: AtomicBool,
}

impl MockLlm {
    /// Mock answering with `responses` in order.
    pub fn new<I, T>(responses: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            available: true,
            stream_by_char: AtomicBool::new(false),
        }
    }

    /// Mock answering `content` to every call.
    pub fn always(content: impl Into<String>) -> Self {
        Self::new(Vec::<String>::new()).with_fallback(content)
    }

    /// Mock that reports unavailable and fails every call.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn with_fallback(mut self, content: impl Into<String>) -> Self {
        self.fallback = Some(content.into());
        self
    }

    /// Appends a failing call to the script.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.lock_responses().push_back(Err(message.into()));
        self
    }

    /// When true, streaming sends one chunk per character.
    pub fn set_stream_by_char(&self, on: bool) {
        self.stream_by_char.store(on, Ordering::SeqCst);
    }

    /// Number of `generate_answer` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far (with payload context appended).
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmBackend for MockLlm {
    async fn generate_answer(
        &self,
        prompt: &str,
        payload: &Value,
        _options: &GenerateOptions,
        on_token: Option<mpsc::Sender<TokenChunk>>,
    ) -> Result<String, FlowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt_with_payload(prompt, payload));
        if !self.available {
            return Err(FlowError::BackendUnavailable("mock llm is unavailable".into()));
        }
        let next = self.lock_responses().pop_front();
        let content = match next {
            Some(Ok(content)) => content,
            Some(Err(message)) => return Err(FlowError::Llm(message)),
            None => match &self.fallback {
                Some(content) => content.clone(),
                None => return Err(FlowError::Llm("mock llm script exhausted".into())),
            },
        };
        if let Some(tx) = on_token {
            if self.stream_by_char.load(Ordering::SeqCst) {
                for c in content.chars() {
                    let _ = tx
                        .send(TokenChunk {
                            content: c.to_string(),
                        })
                        .await;
                }
            } else if !content.is_empty() {
                let _ = tx
                    .send(TokenChunk {
                        content: content.clone(),
                    })
                    .await;
            }
        }
        Ok(content)
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "mock".to_string(),
            kind: BackendKind::Mock,
        }
    }
}
