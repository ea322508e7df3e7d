//! OpenAI-compatible chat completions backend (hosted API or a local server exposing the
//! same endpoint).
//!
//! Single-shot when no token sender is given; otherwise requests `stream: true` and parses
//! server-sent events, forwarding each content delta.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::FlowError;

use super::{prompt_with_payload, BackendInfo, BackendKind, GenerateOptions, LlmBackend, TokenChunk};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat-completions client.
///
/// **Interaction**: Built by `resolve_backend` from `LlmSettings`.
pub struct OpenAiCompatible {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    kind: BackendKind,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatible {
    /// Client for `{base_url}/chat/completions`. A base ending in `/v1` or any other path is
    /// used as is.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        kind: BackendKind,
    ) -> Result<Self, FlowError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FlowError::Llm(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: chat_endpoint(base_url),
            api_key,
            model: model.into(),
            kind,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn headers(&self) -> Result<HeaderMap, FlowError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let value = format!("Bearer {}", key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|e| FlowError::Llm(e.to_string()))?,
            );
        }
        Ok(headers)
    }

    async fn read_stream(
        response: reqwest::Response,
        tx: mpsc::Sender<TokenChunk>,
    ) -> Result<String, FlowError> {
        let mut body = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|e| FlowError::Llm(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));
            while let Some(nl) = buffer.find('\n') {
                let line: String = buffer.drain(..=nl).collect();
                match parse_sse_line(&line) {
                    SseLine::Delta(delta) => {
                        content.push_str(&delta);
                        let _ = tx.send(TokenChunk { content: delta }).await;
                    }
                    SseLine::Done => return Ok(content),
                    SseLine::Skip => {}
                }
            }
        }
        if let SseLine::Delta(delta) = parse_sse_line(&buffer) {
            content.push_str(&delta);
            let _ = tx.send(TokenChunk { content: delta }).await;
        }
        Ok(content)
    }
}

fn chat_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|s| !s.is_empty())
            .map(SseLine::Delta)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed stream chunk");
            SseLine::Skip
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatible {
    async fn generate_answer(
        &self,
        prompt: &str,
        payload: &Value,
        options: &GenerateOptions,
        on_token: Option<mpsc::Sender<TokenChunk>>,
    ) -> Result<String, FlowError> {
        let user = prompt_with_payload(prompt, payload);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &user,
        });
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: on_token.is_some(),
        };
        tracing::debug!(endpoint = %self.endpoint, model = %self.model, stream = body.stream, "llm request");

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| FlowError::Llm(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FlowError::Llm(format!("HTTP {}: {}", status, text)));
        }

        if let Some(tx) = on_token {
            return Self::read_stream(response, tx).await;
        }

        let text = response
            .text()
            .await
            .map_err(|e| FlowError::Llm(e.to_string()))?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| FlowError::Llm(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| FlowError::Llm("response has no choices".to_string()))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: self.model.clone(),
            kind: self.kind,
        }
    }
}
