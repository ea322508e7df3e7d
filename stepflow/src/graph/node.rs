//! Graph node trait: one stage in a StateGraph.
//!
//! Receives a read-only view of the state and returns a partial update; the engine merges
//! the update into the state and picks the next stage from the routing table.

use async_trait::async_trait;

use crate::error::FlowError;

use super::{GraphState, RunContext};

/// One stage in a graph: state in, partial update out.
///
/// Stages never mutate the state directly and never choose their successor; routing lives
/// in the graph's edges so it can be inspected and tested apart from stage bodies.
///
/// **Interaction**: Registered with `StateGraph::add_node`; invoked by
/// `CompiledStateGraph::execute` and `CompiledStateGraph::execute_parallel`.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: GraphState,
{
    /// Node id (e.g. `"planner"`, `"dispatcher"`). Must be unique within a graph.
    fn id(&self) -> &str;

    /// One stage: read `state`, return the update to merge.
    ///
    /// Returning `Err` halts the run; the engine records the error in the trace and in the
    /// state's error field.
    async fn run(&self, state: &S, ctx: &RunContext) -> Result<S::Update, FlowError>;
}
