//! StateGraph execution: static and computed routing, trace entries, progress events.

use std::sync::{Arc, Mutex};

use stepflow::{ProgressEvent, ProgressWriter, RunContext, StateGraph, END, START};

use crate::common::{AddStage, CounterState};

fn recording_writer() -> (ProgressWriter, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let writer = ProgressWriter::new(move |ev| sink.lock().unwrap().push(ev));
    (writer, events)
}

/// **Scenario**: A linear chain runs each stage once in order and records one trace entry per stage.
#[tokio::test]
async fn linear_chain_runs_in_order() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("a", Arc::new(AddStage::new("a", 1)))
        .add_node("b", Arc::new(AddStage::new("b", 10)))
        .add_edge(START, "a")
        .add_edge("a", "b")
        .add_edge("b", END);
    let compiled = graph.compile().unwrap();

    let state = compiled
        .execute(CounterState::default(), ProgressWriter::noop())
        .await;
    assert_eq!(state.visits, vec!["a", "b"]);
    assert_eq!(state.count, 11);
    assert!(state.error.is_none());
    let stages: Vec<&str> = state.trace.entries().iter().map(|e| e.stage.as_str()).collect();
    assert_eq!(stages, vec!["a", "b"]);
    assert!(state.trace.entries().iter().all(|e| e.ok && !e.parallel));
    assert_eq!(state.trace.entries()[1].snapshot["count"], 1);
}

/// **Scenario**: A computed route loops on a stage until the state says stop.
#[tokio::test]
async fn computed_route_loops_until_condition() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("inc", Arc::new(AddStage::new("inc", 1)))
        .add_edge(START, "inc")
        .add_conditional_edge(
            "inc",
            Arc::new(|s: &CounterState| {
                if s.count >= 3 {
                    END.to_string()
                } else {
                    "inc".to_string()
                }
            }),
        );
    let compiled = graph.compile().unwrap();

    let state = compiled
        .execute(CounterState::default(), ProgressWriter::noop())
        .await;
    assert_eq!(state.count, 3);
    assert_eq!(state.trace.count_for("inc"), 3);
}

/// **Scenario**: A stage without an outgoing edge ends the run.
#[tokio::test]
async fn stage_without_edge_ends_run() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("only", Arc::new(AddStage::new("only", 2)))
        .add_edge(START, "only");
    let state = graph
        .compile()
        .unwrap()
        .execute(CounterState::default(), ProgressWriter::noop())
        .await;
    assert_eq!(state.count, 2);
    assert!(state.error.is_none());
}

/// **Scenario**: Every stage emits a StageEnter and a StageExit event, in order.
#[tokio::test]
async fn stage_events_bracket_each_stage() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("a", Arc::new(AddStage::new("a", 1)))
        .add_node("b", Arc::new(AddStage::new("b", 1)))
        .add_edge(START, "a")
        .add_edge("a", "b");
    let compiled = graph.compile().unwrap();
    let (writer, events) = recording_writer();

    compiled
        .execute_with_context(CounterState::default(), RunContext::new(writer).with_run_id("run-fixed"))
        .await;
    let events = events.lock().unwrap();
    let kinds: Vec<String> = events
        .iter()
        .map(|e| match e {
            ProgressEvent::StageEnter { stage } => format!("enter:{}", stage),
            ProgressEvent::StageExit { stage, ok, .. } => format!("exit:{}:{}", stage, ok),
            other => format!("{:?}", other),
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["enter:a", "exit:a:true", "enter:b", "exit:b:true"]
    );
}
