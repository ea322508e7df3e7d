//! Workflow engine: named stages, a routing table, and a run loop with tracing.
//!
//! StateGraph: add stages and edges, compile, then execute with a state.

mod compile_error;
mod compiled;
mod edge;
mod logging;
mod node;
mod run_context;
mod state;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::{CompiledStateGraph, StageOutcome};
pub use edge::{Edge, RouteFn};
pub use logging::{
    log_graph_complete, log_graph_error, log_graph_start, log_route, log_stage_complete,
    log_stage_start, log_state_update,
};
pub use node::Node;
pub use run_context::RunContext;
pub use state::GraphState;
pub use state_graph::{StateGraph, DEFAULT_MAX_ITERATIONS, DEFAULT_SNAPSHOT_CHARS, END, START};
