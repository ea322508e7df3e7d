//! Logging helpers for graph execution.
//!
//! Structured `tracing` events for run start/complete, per-stage execution, routing and
//! state updates.

use crate::error::FlowError;

/// Log stage execution start.
pub fn log_stage_start(stage: &str) {
    tracing::debug!(stage = stage, "Starting stage execution");
}

/// Log stage execution completion.
pub fn log_stage_complete(stage: &str, duration_ms: u64) {
    tracing::debug!(stage = stage, duration_ms, "Stage execution complete");
}

/// Log a state merge after a stage.
pub fn log_state_update(stage: &str) {
    tracing::debug!(stage = stage, "State updated");
}

/// Log a routing decision.
pub fn log_route(from: &str, to: &str) {
    tracing::debug!(from = from, to = to, "route");
}

/// Log graph execution start.
pub fn log_graph_start(run_id: &str) {
    tracing::info!(run_id = run_id, "Starting graph execution");
}

/// Log graph execution completion.
pub fn log_graph_complete(run_id: &str, iterations: usize) {
    tracing::info!(run_id = run_id, iterations, "Graph execution complete");
}

/// Log graph execution error.
pub fn log_graph_error(error: &FlowError) {
    tracing::error!(?error, "Graph execution error");
}
