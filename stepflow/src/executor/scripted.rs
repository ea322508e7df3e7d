//! Executor that replays scripted responses; for tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FlowError;

use super::{CommandExecutor, ExecRequest, ExecResponse};

type Handler = Box<dyn Fn(&ExecRequest) -> Result<ExecResponse, String> + Send + Sync>;

/// Scripted executor: answers calls from a queue (or a handler) and records every request
/// with the timeout it was given.
pub struct ScriptedExecutor {
    queue: Mutex<VecDeque<Result<ExecResponse, String>>>,
    handler: Option<Handler>,
    requests: Mutex<Vec<(ExecRequest, Duration)>>,
}

impl ScriptedExecutor {
    /// Answers calls with `responses` in order; calls past the end fail.
    pub fn new(responses: impl IntoIterator<Item = ExecResponse>) -> Self {
        Self {
            queue: Mutex::new(responses.into_iter().map(Ok).collect()),
            handler: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call that the queue does not cover with `handler`.
    pub fn from_fn(
        handler: impl Fn(&ExecRequest) -> Result<ExecResponse, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            handler: Some(Box::new(handler)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Appends a call that fails at the transport level (e.g. service unreachable).
    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(message.into()));
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ExecRequest> {
        self.lock_requests().iter().map(|(r, _)| r.clone()).collect()
    }

    /// Timeouts passed with each request so far.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.lock_requests().iter().map(|(_, t)| *t).collect()
    }

    pub fn call_count(&self) -> usize {
        self.lock_requests().len()
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<(ExecRequest, Duration)>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &ExecRequest,
        timeout: Duration,
    ) -> Result<ExecResponse, FlowError> {
        self.lock_requests().push((request.clone(), timeout));
        let queued = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let outcome = match (queued, &self.handler) {
            (Some(outcome), _) => outcome,
            (None, Some(handler)) => handler(request),
            (None, None) => Err("scripted executor has no response left".to_string()),
        };
        outcome.map_err(FlowError::Executor)
    }
}
