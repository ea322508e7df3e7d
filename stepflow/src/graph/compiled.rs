//! Compiled state graph: immutable, supports execute only.
//!
//! Built by `StateGraph::compile`. Owns the state for the duration of a run: invokes one
//! stage at a time (or a declared parallel batch), merges each update, records a trace
//! entry per stage invocation and routes until `END`, a stage without an edge, a stage
//! error, or the iteration cap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tracing::Instrument;

use crate::error::FlowError;
use crate::progress::{ProgressEvent, ProgressWriter};
use crate::trace::TraceEntry;

use super::edge::Edge;
use super::logging::{
    log_graph_complete, log_graph_error, log_graph_start, log_route, log_stage_complete,
    log_stage_start, log_state_update,
};
use super::state_graph::END;
use super::{GraphState, Node, RunContext};

/// Result of one stage in a parallel batch.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub stage: String,
    pub ok: bool,
    pub error: Option<String>,
}

/// Compiled graph: immutable structure, supports execute only.
///
/// Created by `StateGraph::compile()`. Cheap to clone; stages are shared.
pub struct CompiledStateGraph<S> {
    pub(super) nodes: HashMap<String, Arc<dyn Node<S>>>,
    /// First stage to run (target of the START edge).
    pub(super) first: String,
    /// Outgoing route per stage; a stage without an entry ends the run.
    pub(super) routes: HashMap<String, Edge<S>>,
    pub(super) max_iterations: usize,
    pub(super) snapshot_chars: usize,
}

impl<S> Clone for CompiledStateGraph<S> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            first: self.first.clone(),
            routes: self.routes.clone(),
            max_iterations: self.max_iterations,
            snapshot_chars: self.snapshot_chars,
        }
    }
}

impl<S> CompiledStateGraph<S>
where
    S: GraphState,
{
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Stage ids registered in this graph, sorted.
    pub fn stage_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Runs the graph from its first stage and returns the final state.
    ///
    /// Never fails: a stage error, an unknown computed target, or exceeding the iteration
    /// cap is recorded through `GraphState::record_engine_error` and ends the run.
    pub async fn execute(&self, state: S, progress: ProgressWriter) -> S {
        self.execute_with_context(state, RunContext::new(progress))
            .await
    }

    /// Like `execute`, with a caller-built context (fixed run id for correlation).
    pub async fn execute_with_context(&self, mut state: S, ctx: RunContext) -> S {
        log_graph_start(&ctx.run_id);
        let mut current = self.first.clone();
        let mut iterations = 0usize;

        loop {
            if iterations >= self.max_iterations {
                self.halt(
                    &mut state,
                    FlowError::LoopLimit {
                        limit: self.max_iterations,
                    },
                );
                break;
            }
            iterations += 1;
            let stage_ctx = ctx.at_iteration(iterations);

            let node = match self.nodes.get(&current) {
                Some(node) => Arc::clone(node),
                None => {
                    self.halt(&mut state, FlowError::UnknownStage(current.clone()));
                    break;
                }
            };
            if !self
                .run_stage(&mut state, &current, node, &stage_ctx)
                .await
            {
                break;
            }

            let next = match self.routes.get(&current) {
                None => break,
                Some(Edge::Parallel { stages, then }) => {
                    if iterations + stages.len() > self.max_iterations {
                        self.halt(
                            &mut state,
                            FlowError::LoopLimit {
                                limit: self.max_iterations,
                            },
                        );
                        break;
                    }
                    iterations += stages.len();
                    let batch: Vec<&str> = stages.iter().map(String::as_str).collect();
                    self.execute_parallel(&mut state, &batch, &stage_ctx).await;
                    then.clone()
                }
                Some(edge) => edge.resolve(&state),
            };
            log_route(&current, &next);
            if next == END {
                break;
            }
            current = next;
        }

        log_graph_complete(&ctx.run_id, iterations);
        state
    }

    /// Runs `stages` concurrently against one snapshot of `state`, then merges the
    /// successful updates in list order.
    ///
    /// Every stage gets its own trace entry (marked parallel). A failing stage does not
    /// abort its siblings and does not halt the run; its error is returned in the outcome
    /// and kept in the trace.
    pub async fn execute_parallel(
        &self,
        state: &mut S,
        stages: &[&str],
        ctx: &RunContext,
    ) -> Vec<StageOutcome> {
        let snapshot = state.clone();
        let input = snapshot.trace_snapshot(self.snapshot_chars);

        let runs = stages.iter().map(|stage| {
            let snapshot = &snapshot;
            let node = self.nodes.get(*stage).cloned();
            async move {
                ctx.emit(ProgressEvent::StageEnter {
                    stage: stage.to_string(),
                });
                log_stage_start(stage);
                let started_at = Utc::now();
                let clock = Instant::now();
                let result = match node {
                    Some(node) => node.run(snapshot, ctx).await,
                    None => Err(FlowError::UnknownStage(stage.to_string())),
                };
                (started_at, clock.elapsed().as_millis() as u64, result)
            }
        });
        let results = join_all(runs).await;

        let mut outcomes = Vec::with_capacity(stages.len());
        for (stage, (started_at, duration_ms, result)) in stages.iter().zip(results) {
            let (ok, error) = match result {
                Ok(update) => {
                    state.apply_update(update);
                    log_state_update(stage);
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(stage = *stage, error = %e, "parallel stage failed");
                    (false, Some(e.to_string()))
                }
            };
            log_stage_complete(stage, duration_ms);
            state.trace_mut().push(TraceEntry {
                stage: stage.to_string(),
                started_at,
                duration_ms,
                snapshot: input.clone(),
                ok,
                error: error.clone(),
                parallel: true,
            });
            ctx.emit(ProgressEvent::StageExit {
                stage: stage.to_string(),
                ok,
                duration_ms,
            });
            outcomes.push(StageOutcome {
                stage: stage.to_string(),
                ok,
                error,
            });
        }
        outcomes
    }

    /// Runs one stage and merges its update. Returns false when the stage failed and the
    /// run must halt.
    async fn run_stage(
        &self,
        state: &mut S,
        stage: &str,
        node: Arc<dyn Node<S>>,
        ctx: &RunContext,
    ) -> bool {
        ctx.emit(ProgressEvent::StageEnter {
            stage: stage.to_string(),
        });
        log_stage_start(stage);
        let snapshot = state.trace_snapshot(self.snapshot_chars);
        let started_at = Utc::now();
        let clock = Instant::now();
        let span = tracing::debug_span!("stage", stage = stage, iteration = ctx.iteration);
        let result = node.run(&*state, ctx).instrument(span).await;
        let duration_ms = clock.elapsed().as_millis() as u64;
        log_stage_complete(stage, duration_ms);

        let (ok, error) = match result {
            Ok(update) => {
                state.apply_update(update);
                log_state_update(stage);
                (true, None)
            }
            Err(e) => (false, Some(e)),
        };
        state.trace_mut().push(TraceEntry {
            stage: stage.to_string(),
            started_at,
            duration_ms,
            snapshot,
            ok,
            error: error.as_ref().map(ToString::to_string),
            parallel: false,
        });
        ctx.emit(ProgressEvent::StageExit {
            stage: stage.to_string(),
            ok,
            duration_ms,
        });
        match error {
            None => true,
            Some(e) => {
                self.halt(state, e);
                false
            }
        }
    }

    fn halt(&self, state: &mut S, error: FlowError) {
        log_graph_error(&error);
        state.record_engine_error(&error);
    }
}
