//! Parallel batches: one snapshot in, updates merged in list order.

use std::sync::Arc;

use stepflow::{ProgressWriter, RunContext, StateGraph, END, START};

use crate::common::{AddStage, CounterState, FailingStage};

/// **Scenario**: Stages in a batch run concurrently but their updates merge in declared order.
#[tokio::test]
async fn batch_merges_in_list_order() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("start", Arc::new(AddStage::new("start", 0)))
        .add_node("slow", Arc::new(AddStage::slow("slow", 1, 40)))
        .add_node("fast", Arc::new(AddStage::new("fast", 2)))
        .add_node("join", Arc::new(AddStage::new("join", 0)))
        .add_edge(START, "start")
        .add_parallel_edge("start", ["slow", "fast"], "join")
        .add_edge("join", END);

    let state = graph
        .compile()
        .unwrap()
        .execute(CounterState::default(), ProgressWriter::noop())
        .await;
    assert_eq!(state.visits, vec!["start", "slow", "fast", "join"]);
    assert_eq!(state.count, 3);
    let parallel: Vec<&str> = state
        .trace
        .entries()
        .iter()
        .filter(|e| e.parallel)
        .map(|e| e.stage.as_str())
        .collect();
    assert_eq!(parallel, vec!["slow", "fast"]);
}

/// **Scenario**: A failing stage in a batch does not abort its siblings or halt the run.
#[tokio::test]
async fn failing_stage_does_not_abort_batch() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("failing", Arc::new(FailingStage))
        .add_node("ok", Arc::new(AddStage::new("ok", 5)))
        .add_node("start", Arc::new(AddStage::new("start", 0)))
        .add_edge(START, "start")
        .add_parallel_edge("start", ["failing", "ok"], END);
    let compiled = graph.compile().unwrap();

    let mut state = CounterState::default();
    let outcomes = compiled
        .execute_parallel(&mut state, &["failing", "ok"], &RunContext::default())
        .await;
    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].ok);
    assert!(outcomes[0].error.as_deref().unwrap().contains("always fails"));
    assert!(outcomes[1].ok);
    assert_eq!(state.count, 5);
    assert!(state.error.is_none());

    let state = compiled
        .execute(CounterState::default(), ProgressWriter::noop())
        .await;
    assert_eq!(state.count, 5);
    assert!(state.error.is_none());
}
