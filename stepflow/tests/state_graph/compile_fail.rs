//! StateGraph compile validation.

use std::sync::Arc;

use stepflow::{CompilationError, StateGraph, END, START};

use crate::common::{AddStage, CounterState};

/// **Scenario**: An edge to an unregistered stage fails compilation with NodeNotFound.
#[test]
fn edge_to_unknown_stage_fails() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("a", Arc::new(AddStage::new("a", 1)))
        .add_edge(START, "a")
        .add_edge("a", "missing");
    match graph.compile() {
        Err(CompilationError::NodeNotFound(id)) => assert_eq!(id, "missing"),
        other => panic!("expected NodeNotFound, got {:?}", other.err()),
    }
}

/// **Scenario**: A graph without an edge from START does not compile.
#[test]
fn missing_start_fails() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("a", Arc::new(AddStage::new("a", 1)))
        .add_edge("a", END);
    assert!(matches!(graph.compile(), Err(CompilationError::MissingStart)));
}

/// **Scenario**: Two routing entries from one stage are rejected.
#[test]
fn duplicate_route_fails() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("a", Arc::new(AddStage::new("a", 1)))
        .add_node("b", Arc::new(AddStage::new("b", 1)))
        .add_edge(START, "a")
        .add_edge("a", "b")
        .add_conditional_edge("a", Arc::new(|_: &CounterState| END.to_string()));
    assert!(matches!(
        graph.compile(),
        Err(CompilationError::DuplicateRoute(id)) if id == "a"
    ));
}

/// **Scenario**: A parallel edge listing no stages is rejected.
#[test]
fn empty_parallel_batch_fails() {
    let mut graph = StateGraph::<CounterState>::new();
    graph
        .add_node("a", Arc::new(AddStage::new("a", 1)))
        .add_edge(START, "a")
        .add_parallel_edge("a", Vec::<String>::new(), END);
    assert!(matches!(
        graph.compile(),
        Err(CompilationError::EmptyParallelBatch(_))
    ));
}
