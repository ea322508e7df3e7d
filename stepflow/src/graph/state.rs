//! State contract between the engine and the state type it threads through stages.
//!
//! Stages return `Update` values; the engine owns the state for the duration of a run and
//! merges each update through [`GraphState::apply_update`].

use std::fmt::Debug;

use serde_json::Value;

use crate::error::FlowError;
use crate::trace::ExecutionTrace;

/// State type usable with `StateGraph`.
///
/// Implementors define how a partial update is merged (e.g. append results, replace the
/// plan) and which fields a trace entry should capture.
pub trait GraphState: Clone + Send + Sync + Debug + 'static {
    /// Partial update returned by a stage.
    type Update: Send + Sync + Debug + 'static;

    /// Merges `update` into `self`.
    fn apply_update(&mut self, update: Self::Update);

    /// Size-bounded snapshot of the fields relevant to tracing. Not the full state.
    fn trace_snapshot(&self, max_chars: usize) -> Value;

    /// Trace the engine appends to.
    fn trace_mut(&mut self) -> &mut ExecutionTrace;

    /// Records an engine-level halt (stage error, unknown stage, loop limit).
    fn record_engine_error(&mut self, error: &FlowError);
}
