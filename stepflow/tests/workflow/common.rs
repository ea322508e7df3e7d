//! Shared helpers for workflow integration tests.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use stepflow::{
    MockLlm, ProgressEvent, ProgressWriter, ScriptedExecutor, Settings, TaskRunner, WorkflowDeps,
};

/// Runner plus handles on its test doubles.
pub struct Harness {
    pub runner: TaskRunner,
    pub llm: Arc<MockLlm>,
    pub executor: Arc<ScriptedExecutor>,
}

pub fn harness(llm: MockLlm, executor: ScriptedExecutor) -> Harness {
    harness_with(llm, executor, Settings::default())
}

pub fn harness_with(llm: MockLlm, executor: ScriptedExecutor, settings: Settings) -> Harness {
    let llm = Arc::new(llm);
    let executor = Arc::new(executor);
    let runner = TaskRunner::new(WorkflowDeps {
        llm: llm.clone(),
        executor: executor.clone(),
        settings: Arc::new(settings),
    })
    .unwrap();
    Harness {
        runner,
        llm,
        executor,
    }
}

/// Planner answer with one `shell_run` step per command.
pub fn shell_plan(commands: &[&str]) -> String {
    let steps: Vec<Value> = commands
        .iter()
        .map(|c| json!({"skill": "shell_run", "args": {"command": c}, "description": c}))
        .collect();
    Value::Array(steps).to_string()
}

/// Planner answer from raw step objects.
pub fn plan(steps: Vec<Value>) -> String {
    Value::Array(steps).to_string()
}

/// Writer that keeps every event.
pub fn recording_writer() -> (ProgressWriter, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let writer = ProgressWriter::new(move |ev| sink.lock().unwrap().push(ev));
    (writer, events)
}

/// `(decision, fast_path)` of every Recovery event, in order.
pub fn recoveries(events: &[ProgressEvent]) -> Vec<(String, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Recovery {
                decision,
                fast_path,
                ..
            } => Some((decision.clone(), *fast_path)),
            _ => None,
        })
        .collect()
}

/// Outcome strings of every Complete event, in order.
pub fn completions(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Complete { outcome, .. } => Some(outcome.clone()),
            _ => None,
        })
        .collect()
}
