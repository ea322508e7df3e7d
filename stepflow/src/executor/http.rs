//! HTTP client for a running command-execution service: `POST {base}/execute`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::FlowError;
use crate::state::Skill;

use super::{CommandExecutor, ExecRequest, ExecResponse};

/// Extra time allowed past the step timeout before the HTTP call is abandoned.
const TRANSPORT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct ExecuteBody<'a> {
    skill: Skill,
    args: &'a Map<String, Value>,
    timeout_ms: u64,
}

/// Executor backed by the service's HTTP API.
pub struct HttpExecutor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExecutor {
    pub fn new(base_url: &str) -> Result<Self, FlowError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FlowError::Executor(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/execute", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CommandExecutor for HttpExecutor {
    async fn execute(
        &self,
        request: &ExecRequest,
        timeout: Duration,
    ) -> Result<ExecResponse, FlowError> {
        let body = ExecuteBody {
            skill: request.skill,
            args: &request.args,
            timeout_ms: timeout.as_millis() as u64,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout + TRANSPORT_GRACE)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FlowError::Executor(format!(
                        "timeout: no response after {} ms",
                        timeout.as_millis()
                    ))
                } else {
                    FlowError::Executor(format!("executor unreachable: {}", e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FlowError::Executor(e.to_string()))?;
        match serde_json::from_str::<ExecResponse>(&text) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => {
                Err(FlowError::Executor(format!("HTTP {}: {}", status, text)))
            }
            Err(e) => Err(FlowError::Executor(format!("malformed response: {}", e))),
        }
    }
}
