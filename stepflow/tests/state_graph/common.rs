//! Shared types for StateGraph integration tests: CounterState and a few stages.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use stepflow::{ExecutionTrace, FlowError, GraphState, Node, RunContext};

#[derive(Debug, Clone, Default)]
pub struct CounterState {
    pub visits: Vec<String>,
    pub count: u32,
    pub error: Option<String>,
    pub trace: ExecutionTrace,
}

#[derive(Debug)]
pub struct CounterUpdate {
    pub stage: String,
    pub add: u32,
}

impl GraphState for CounterState {
    type Update = CounterUpdate;

    fn apply_update(&mut self, update: CounterUpdate) {
        self.visits.push(update.stage);
        self.count += update.add;
    }

    fn trace_snapshot(&self, _max_chars: usize) -> Value {
        json!({ "count": self.count, "visits": self.visits.len() })
    }

    fn trace_mut(&mut self) -> &mut ExecutionTrace {
        &mut self.trace
    }

    fn record_engine_error(&mut self, error: &FlowError) {
        self.error = Some(error.to_string());
    }
}

/// Adds `add` to the counter after an optional delay.
pub struct AddStage {
    id: String,
    add: u32,
    delay: Duration,
}

impl AddStage {
    pub fn new(id: &str, add: u32) -> Self {
        Self {
            id: id.to_string(),
            add,
            delay: Duration::ZERO,
        }
    }

    pub fn slow(id: &str, add: u32, delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            ..Self::new(id, add)
        }
    }
}

#[async_trait]
impl Node<CounterState> for AddStage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, _state: &CounterState, _ctx: &RunContext) -> Result<CounterUpdate, FlowError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(CounterUpdate {
            stage: self.id.clone(),
            add: self.add,
        })
    }
}

/// Stage whose body always fails.
pub struct FailingStage;

#[async_trait]
impl Node<CounterState> for FailingStage {
    fn id(&self) -> &str {
        "failing"
    }

    async fn run(&self, _state: &CounterState, _ctx: &RunContext) -> Result<CounterUpdate, FlowError> {
        Err(FlowError::ExecutionFailed("always fails".to_string()))
    }
}
