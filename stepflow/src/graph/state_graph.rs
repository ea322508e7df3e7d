//! State graph: named stages plus a routing table of static, computed and parallel edges.
//!
//! Add stages with `add_node`, route with `add_edge(from, to)` using `START` and `END` for
//! entry/exit, `add_conditional_edge` for state-based routing, and `add_parallel_edge` for
//! a concurrent batch. Then `compile` to get a `CompiledStateGraph`.
//!
//! # Routing
//!
//! Each stage has at most one outgoing edge. A stage without an edge ends the run after it
//! executes. Computed edges are evaluated against the state after the stage's update has
//! been merged; their targets are checked at run time.

use std::collections::HashMap;
use std::sync::Arc;

use crate::graph::compile_error::CompilationError;
use crate::graph::compiled::CompiledStateGraph;
use crate::graph::edge::{Edge, RouteFn};
use crate::graph::node::Node;
use crate::graph::GraphState;

/// Sentinel for graph entry: use as `from` in `add_edge(START, first_stage)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: use as a target to end the run.
pub const END: &str = "__end__";

/// Default hard cap on stage executions per run.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Default character budget for one trace snapshot.
pub const DEFAULT_SNAPSHOT_CHARS: usize = 2000;

/// State graph: stages plus a routing table.
///
/// Generic over state type `S`. Build with `add_node` / `add_edge` and friends, then
/// `compile()` to obtain an executable graph.
///
/// **Interaction**: Accepts `Arc<dyn Node<S>>`; produces `CompiledStateGraph<S>`.
pub struct StateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    /// Routing entries in insertion order; duplicates are rejected at compile time.
    edges: Vec<(String, Edge<S>)>,
    max_iterations: usize,
    snapshot_chars: usize,
}

impl<S> Default for StateGraph<S>
where
    S: GraphState,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S>
where
    S: GraphState,
{
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            snapshot_chars: DEFAULT_SNAPSHOT_CHARS,
        }
    }

    /// Sets the hard cap on stage executions per run (stages of a parallel batch count
    /// once each).
    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Sets the character budget of each trace snapshot.
    pub fn with_snapshot_chars(self, snapshot_chars: usize) -> Self {
        Self {
            snapshot_chars,
            ..self
        }
    }

    /// Adds a stage; id must be unique. Replaces if same id.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node<S>>) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Adds a static edge from `from` to `to`.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), Edge::Static(to.into())));
        self
    }

    /// Adds a computed edge: after `from` runs, `route(state)` names the next stage.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// graph.add_conditional_edge(
    ///     "dispatcher",
    ///     Arc::new(|s: &WorkflowState| {
    ///         if s.failed_step.is_some() { "recovery".into() } else { "dispatcher".into() }
    ///     }),
    /// );
    /// ```
    pub fn add_conditional_edge(&mut self, from: impl Into<String>, route: RouteFn<S>) -> &mut Self {
        self.edges.push((from.into(), Edge::Computed(route)));
        self
    }

    /// Adds a parallel edge: after `from` runs, every stage in `stages` runs concurrently
    /// against one snapshot of the state, then the run continues with `then`.
    pub fn add_parallel_edge<I, T>(
        &mut self,
        from: impl Into<String>,
        stages: I,
        then: impl Into<String>,
    ) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.edges.push((
            from.into(),
            Edge::Parallel {
                stages: stages.into_iter().map(Into::into).collect(),
                then: then.into(),
            },
        ));
        self
    }

    /// Builds the executable graph.
    ///
    /// Returns `CompilationError` if an edge references an unknown stage, START has no
    /// static edge, a stage has two routing entries, or a parallel batch is empty.
    pub fn compile(self) -> Result<CompiledStateGraph<S>, CompilationError> {
        let mut routes: HashMap<String, Edge<S>> = HashMap::new();
        for (from, edge) in self.edges {
            if from != START && !self.nodes.contains_key(&from) {
                return Err(CompilationError::NodeNotFound(from));
            }
            if let Edge::Parallel { stages, .. } = &edge {
                if stages.is_empty() {
                    return Err(CompilationError::EmptyParallelBatch(from));
                }
                if let Some(end) = stages.iter().find(|s| s.as_str() == END) {
                    return Err(CompilationError::NodeNotFound(end.clone()));
                }
            }
            for target in edge.static_targets() {
                if target != END && !self.nodes.contains_key(target) {
                    return Err(CompilationError::NodeNotFound(target.to_string()));
                }
            }
            if routes.contains_key(&from) {
                return Err(CompilationError::DuplicateRoute(from));
            }
            routes.insert(from, edge);
        }

        let first = match routes.remove(START) {
            Some(Edge::Static(first)) if first != END => first,
            _ => return Err(CompilationError::MissingStart),
        };

        Ok(CompiledStateGraph {
            nodes: self.nodes,
            first,
            routes,
            max_iterations: self.max_iterations,
            snapshot_chars: self.snapshot_chars,
        })
    }
}
