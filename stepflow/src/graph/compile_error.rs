//! Graph compilation error.
//!
//! Returned by `StateGraph::compile` when the routing table references unknown stages
//! or is otherwise unusable.

use thiserror::Error;

/// Error when compiling a state graph.
///
/// Validation ensures every stage named in an edge (except START/END) exists in the node
/// map, START has exactly one static edge, and no stage has two routing entries.
#[derive(Debug, Error)]
pub enum CompilationError {
    /// A stage id in an edge was not registered via `add_node` (and is not START/END).
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No static edge leaves START, or START has a computed/parallel edge.
    #[error("graph must have exactly one static edge from START")]
    MissingStart,

    /// A stage was given more than one outgoing routing entry.
    #[error("node has more than one outgoing route: {0}")]
    DuplicateRoute(String),

    /// A parallel edge listed no stages.
    #[error("parallel batch after {0} lists no stages")]
    EmptyParallelBatch(String),
}
