//! Workflow assembly: planner → dispatcher ⇄ recovery on the state graph, and the runner
//! that drives one request end to end.
//!
//! ```text
//! START → planner ──(plan)──→ dispatcher ──(failed step)──→ recovery
//!            │  ↑                 ↺ (next step)                 │
//!            │  └──────────(replan)─────────────────────────────┤
//!            │                    │ (auto patch) ←──────────────┤
//!            └─(plan error)→ END ←┴─(complete)      (ask user)──┘→ END
//! ```

use std::sync::Arc;

use tracing::Instrument;

use crate::dispatcher::{DispatcherNode, DISPATCHER_STAGE};
use crate::error::FlowError;
use crate::executor::{CommandExecutor, HttpExecutor};
use crate::graph::{CompilationError, CompiledStateGraph, RunContext, StateGraph, END, START};
use crate::llm::{resolve_backend, BackendInfo, LlmBackend};
use crate::message::Message;
use crate::planner::{PlannerNode, PLANNER_STAGE};
use crate::progress::{ProgressEvent, ProgressWriter};
use crate::recovery::{RecoveryNode, RECOVERY_STAGE};
use crate::settings::Settings;
use crate::state::{Outcome, WorkflowState, INTERNAL_ERROR_MESSAGE};

/// Collaborators of one workflow.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub llm: Arc<dyn LlmBackend>,
    pub executor: Arc<dyn CommandExecutor>,
    pub settings: Arc<Settings>,
}

fn after_planner(state: &WorkflowState) -> String {
    if state.plan_error.is_some() || state.plan.is_empty() {
        END.to_string()
    } else {
        DISPATCHER_STAGE.to_string()
    }
}

fn after_dispatcher(state: &WorkflowState) -> String {
    if state.task_complete {
        END.to_string()
    } else if state.failed_step.is_some() {
        RECOVERY_STAGE.to_string()
    } else {
        DISPATCHER_STAGE.to_string()
    }
}

fn after_recovery(state: &WorkflowState) -> String {
    if state.pending_question.is_some() {
        END.to_string()
    } else if state.plan.is_empty() {
        PLANNER_STAGE.to_string()
    } else {
        DISPATCHER_STAGE.to_string()
    }
}

/// Builds the compiled planner/dispatcher/recovery graph.
pub fn build_workflow(
    deps: &WorkflowDeps,
) -> Result<CompiledStateGraph<WorkflowState>, CompilationError> {
    let mut graph = StateGraph::<WorkflowState>::new()
        .with_max_iterations(deps.settings.max_iterations)
        .with_snapshot_chars(deps.settings.trace_snapshot_chars);
    graph
        .add_node(PLANNER_STAGE, Arc::new(PlannerNode::new(deps.llm.clone())))
        .add_node(
            DISPATCHER_STAGE,
            Arc::new(DispatcherNode::new(
                deps.executor.clone(),
                deps.llm.clone(),
                deps.settings.clone(),
            )),
        )
        .add_node(
            RECOVERY_STAGE,
            Arc::new(RecoveryNode::new(deps.llm.clone(), deps.settings.clone())),
        )
        .add_edge(START, PLANNER_STAGE)
        .add_conditional_edge(PLANNER_STAGE, Arc::new(after_planner))
        .add_conditional_edge(DISPATCHER_STAGE, Arc::new(after_dispatcher))
        .add_conditional_edge(RECOVERY_STAGE, Arc::new(after_recovery));
    graph.compile()
}

/// Runs automation requests on one compiled workflow.
///
/// Cheap to share; each `run` gets its own state and run id.
pub struct TaskRunner {
    graph: CompiledStateGraph<WorkflowState>,
    backend: BackendInfo,
}

impl TaskRunner {
    pub fn new(deps: WorkflowDeps) -> Result<Self, FlowError> {
        let graph =
            build_workflow(&deps).map_err(|e| FlowError::ExecutionFailed(e.to_string()))?;
        Ok(Self {
            graph,
            backend: deps.llm.info(),
        })
    }

    /// Runner talking to the executor at `settings.executor_url`, with the LLM backend
    /// resolved from `settings.llm` (or `injected`).
    pub fn from_settings(
        settings: Settings,
        injected: Option<Arc<dyn LlmBackend>>,
    ) -> Result<Self, FlowError> {
        let llm = resolve_backend(&settings.llm, injected);
        let executor = Arc::new(HttpExecutor::new(&settings.executor_url)?);
        Self::new(WorkflowDeps {
            llm,
            executor,
            settings: Arc::new(settings),
        })
    }

    /// Backend the planner, recovery and synthesis use.
    pub fn backend(&self) -> &BackendInfo {
        &self.backend
    }

    /// Runs a new request. `conversation` holds earlier turns, most recent last.
    pub async fn run(
        &self,
        request: impl Into<String>,
        conversation: Vec<Message>,
        progress: ProgressWriter,
    ) -> WorkflowState {
        self.execute(WorkflowState::new(request, conversation), progress)
            .await
    }

    /// Continues `state` with the user's next message.
    ///
    /// With a pending question the message is its answer and planning resumes from the
    /// failure; otherwise it is a follow-up request that keeps the browser session.
    pub async fn resume(
        &self,
        mut state: WorkflowState,
        reply: impl Into<String>,
        progress: ProgressWriter,
    ) -> WorkflowState {
        let reply = reply.into();
        let state = if state.pending_question.is_some() {
            state.resume_with_reply(reply);
            state
        } else {
            state.follow_up(reply)
        };
        self.execute(state, progress).await
    }

    /// Runs the workflow on a prepared state.
    pub async fn execute(&self, state: WorkflowState, progress: ProgressWriter) -> WorkflowState {
        let ctx = RunContext::new(progress.clone());
        let span = tracing::info_span!("run", run_id = %ctx.run_id);
        tracing::info!(parent: &span, backend = %self.backend.name, request = %state.request, "run start");
        let state = self
            .graph
            .execute_with_context(state, ctx)
            .instrument(span.clone())
            .await;
        let outcome = state.outcome();
        if outcome == Outcome::Failed {
            progress.emit(ProgressEvent::Complete {
                outcome: outcome.as_str().to_string(),
                summary: state
                    .final_answer
                    .clone()
                    .unwrap_or_else(|| INTERNAL_ERROR_MESSAGE.to_string()),
            });
        }
        tracing::info!(
            parent: &span,
            outcome = outcome.as_str(),
            results = state.skill_results.len(),
            "run complete"
        );
        state
    }
}
