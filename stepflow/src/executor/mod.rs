//! Client side of the external command-execution service.
//!
//! The service performs shell, browser and UI-automation primitives; the core only sends
//! `{skill, args}` with a timeout and reads back the response. [`HttpExecutor`] talks to a
//! running service; [`ScriptedExecutor`] replays canned responses for tests.

mod http;
mod scripted;

pub use http::HttpExecutor;
pub use scripted::ScriptedExecutor;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FlowError;
use crate::state::Skill;

/// One call to the service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecRequest {
    pub skill: Skill,
    pub args: Map<String, Value>,
}

/// Service response. Accepts `ok` or `success`, and camelCase or snake_case field names.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecResponse {
    #[serde(default, alias = "success")]
    pub ok: bool,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default, alias = "exitCode")]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, alias = "executionTimeMs")]
    pub execution_time_ms: Option<u64>,
    /// Browser session the action ran in, when the service reports it.
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

impl ExecResponse {
    /// Successful response with `stdout` and exit code 0.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            ok: true,
            stdout: Some(stdout.into()),
            exit_code: Some(0),
            ..Self::default()
        }
    }

    /// Failed response carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = Some(stderr.into());
        self
    }
}

/// Executes one skill call.
///
/// **Interaction**: Held as `Arc<dyn CommandExecutor>` by `DispatcherNode`. `Err` means the
/// call itself failed (unreachable, malformed response); the dispatcher records it as a
/// failed step, same as an `ok: false` response.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &ExecRequest,
        timeout: Duration,
    ) -> Result<ExecResponse, FlowError>;
}
