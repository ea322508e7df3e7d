//! LLM backend abstraction used by the planner, recovery and the synthesize step.
//!
//! # Streaming Support
//!
//! `generate_answer` accepts an optional `Sender<TokenChunk>`. Backends that stream
//! (`OpenAiCompatible`) send each delta as it arrives; others send the whole answer as one
//! chunk. Callers always get the full text as the return value, so they work with either.
//!
//! # Backend selection
//!
//! [`resolve_backend`] picks one backend per run from an immutable [`LlmSettings`]:
//! injected backend, then online, then local, then [`PlaceholderLlm`].

mod mock;
mod openai;
mod placeholder;
mod resolve;

pub use mock::MockLlm;
pub use openai::OpenAiCompatible;
pub use placeholder::PlaceholderLlm;
pub use resolve::resolve_backend;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::FlowError;

#[cfg(doc)]
use crate::settings::LlmSettings;

/// One streamed piece of answer text.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenChunk {
    pub content: String,
}

/// Kind of backend, as reported by `info()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Online,
    Local,
    Mock,
    Placeholder,
}

/// Name and kind of a backend.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub kind: BackendKind,
}

/// Per-call options.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateOptions {
    /// System message; `None` sends only the user prompt.
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            system: None,
            temperature: 0.2,
            max_tokens: None,
        }
    }
}

impl GenerateOptions {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// LLM backend: prompt (plus structured payload) in, answer text out.
///
/// **Interaction**: Held as `Arc<dyn LlmBackend>` by `PlannerNode`, `RecoveryNode` and
/// `DispatcherNode`.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generates an answer for `prompt`. `payload` (when not null) is appended to the
    /// prompt as JSON context. When `on_token` is set, text is also sent as it is produced.
    async fn generate_answer(
        &self,
        prompt: &str,
        payload: &Value,
        options: &GenerateOptions,
        on_token: Option<mpsc::Sender<TokenChunk>>,
    ) -> Result<String, FlowError>;

    /// True when calls can be expected to succeed (configured, not a placeholder).
    fn is_available(&self) -> bool;

    fn info(&self) -> BackendInfo;
}

/// Prompt text with the payload appended as a JSON context block.
pub(crate) fn prompt_with_payload(prompt: &str, payload: &Value) -> String {
    if payload.is_null() {
        return prompt.to_string();
    }
    let rendered = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    format!("{}\n\nContext (JSON):\n{}", prompt, rendered)
}
