//! StateGraph halting: the engine returns the state instead of an error.

use std::sync::Arc;

use stepflow::{ProgressWriter, StateGraph, END, START};

use crate::common::{AddStage, CounterState, FailingStage};

/// **Scenario**: A failing stage halts the run; its error lands in the state and the trace.
#[tokio::test]
async fn stage_error_is_recorded_and_halts() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("a", Arc::new(AddStage::new("a", 1)))
        .add_node("failing", Arc::new(FailingStage))
        .add_node("never", Arc::new(AddStage::new("never", 100)))
        .add_edge(START, "a")
        .add_edge("a", "failing")
        .add_edge("failing", "never");

    let state = graph
        .compile()
        .unwrap()
        .execute(CounterState::default(), ProgressWriter::noop())
        .await;
    assert_eq!(state.count, 1);
    assert!(state.error.as_deref().unwrap().contains("always fails"));
    let last = state.trace.entries().last().unwrap();
    assert_eq!(last.stage, "failing");
    assert!(!last.ok);
    assert!(last.error.as_deref().unwrap().contains("always fails"));
    assert_eq!(state.trace.count_for("never"), 0);
}

/// **Scenario**: A computed route naming an unregistered stage halts with UnknownStage.
#[tokio::test]
async fn unknown_computed_target_halts() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("a", Arc::new(AddStage::new("a", 1)))
        .add_edge(START, "a")
        .add_conditional_edge("a", Arc::new(|_: &CounterState| "ghost".to_string()));

    let state = graph
        .compile()
        .unwrap()
        .execute(CounterState::default(), ProgressWriter::noop())
        .await;
    assert_eq!(state.count, 1);
    assert!(state.error.as_deref().unwrap().contains("ghost"));
}

/// **Scenario**: A route that never reaches END stops at the iteration cap with LoopLimit.
#[tokio::test]
async fn endless_loop_stops_at_cap() {
    let mut graph = StateGraph::<CounterState>::new().with_max_iterations(5);
    graph
        .add_node("spin", Arc::new(AddStage::new("spin", 1)))
        .add_edge(START, "spin")
        .add_edge("spin", "spin");
    let compiled = graph.compile().unwrap();
    assert_eq!(compiled.max_iterations(), 5);

    let state = compiled
        .execute(CounterState::default(), ProgressWriter::noop())
        .await;
    assert_eq!(state.count, 5);
    assert_eq!(state.trace.len(), 5);
    assert!(state.error.as_deref().unwrap().contains('5'));
}

/// **Scenario**: Reaching END exactly at the cap is not an error.
#[tokio::test]
async fn finishing_at_cap_is_ok() {
    let mut graph = StateGraph::<CounterState>::new().with_max_iterations(2);
    graph
        .add_node("a", Arc::new(AddStage::new("a", 1)))
        .add_node("b", Arc::new(AddStage::new("b", 1)))
        .add_edge(START, "a")
        .add_edge("a", "b")
        .add_edge("b", END);
    let state = graph
        .compile()
        .unwrap()
        .execute(CounterState::default(), ProgressWriter::noop())
        .await;
    assert_eq!(state.count, 2);
    assert!(state.error.is_none());
}
