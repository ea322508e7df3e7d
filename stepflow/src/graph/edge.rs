//! Routing table entries.
//!
//! An edge is either a fixed target, a pure function of the current state, or a parallel
//! batch followed by a fixed continuation.

use std::fmt;
use std::sync::Arc;

/// Routing function: reads state, returns the next stage id (or `END`).
///
/// Must be pure; the engine may evaluate it for logging as well as routing.
pub type RouteFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Outgoing route of one stage.
pub enum Edge<S> {
    /// Always continue with the named stage.
    Static(String),
    /// Continue with whatever the function returns for the updated state.
    Computed(RouteFn<S>),
    /// Run `stages` concurrently against one snapshot, merge successes in list order, then
    /// continue with `then`.
    Parallel { stages: Vec<String>, then: String },
}

impl<S> Edge<S> {
    /// Resolves the next target for `state`. Parallel edges resolve to their continuation.
    pub fn resolve(&self, state: &S) -> String {
        match self {
            Edge::Static(to) => to.clone(),
            Edge::Computed(f) => f(state),
            Edge::Parallel { then, .. } => then.clone(),
        }
    }

    /// Stage ids this edge names statically (computed targets are only known at run time).
    pub(crate) fn static_targets(&self) -> Vec<&str> {
        match self {
            Edge::Static(to) => vec![to.as_str()],
            Edge::Computed(_) => Vec::new(),
            Edge::Parallel { stages, then } => stages
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(then.as_str()))
                .collect(),
        }
    }
}

impl<S> Clone for Edge<S> {
    fn clone(&self) -> Self {
        match self {
            Edge::Static(to) => Edge::Static(to.clone()),
            Edge::Computed(f) => Edge::Computed(Arc::clone(f)),
            Edge::Parallel { stages, then } => Edge::Parallel {
                stages: stages.clone(),
                then: then.clone(),
            },
        }
    }
}

impl<S> fmt::Debug for Edge<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Static(to) => f.debug_tuple("Static").field(to).finish(),
            Edge::Computed(_) => f.debug_tuple("Computed").field(&"<fn>").finish(),
            Edge::Parallel { stages, then } => f
                .debug_struct("Parallel")
                .field("stages", stages)
                .field("then", then)
                .finish(),
        }
    }
}
