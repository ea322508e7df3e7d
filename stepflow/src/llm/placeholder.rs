//! Backend used when nothing is configured: never available, every call fails.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::FlowError;

use super::{BackendInfo, BackendKind, GenerateOptions, LlmBackend, TokenChunk};

#[derive(Debug, Default, Clone)]
pub struct PlaceholderLlm;

#[async_trait]
impl LlmBackend for PlaceholderLlm {
    async fn generate_answer(
        &self,
        _prompt: &str,
        _payload: &Value,
        _options: &GenerateOptions,
        _on_token: Option<mpsc::Sender<TokenChunk>>,
    ) -> Result<String, FlowError> {
        Err(FlowError::BackendUnavailable(
            "no LLM backend configured (set OPENAI_API_KEY or STEPFLOW_LOCAL_LLM_URL)".into(),
        ))
    }

    fn is_available(&self) -> bool {
        false
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "placeholder".to_string(),
            kind: BackendKind::Placeholder,
        }
    }
}
