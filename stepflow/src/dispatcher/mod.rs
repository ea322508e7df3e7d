//! Single-step dispatch: one plan step per workflow pass.
//!
//! [`DispatcherNode`] takes the step at the cursor, runs it (inline for `synthesize`, through
//! the [`CommandExecutor`] otherwise) and classifies the outcome:
//!
//! - success, or failure of an optional step: record, advance the cursor, clear the failure;
//! - hard failure: record, keep the cursor, set `failed_step` (routes to recovery).
//!
//! Executor errors are recorded as failed results, never propagated. Once the cursor is past
//! the last step the node writes the final summary and completes the task.

mod search;
mod summary;
mod synthesize;

pub use search::{
    is_search_command, program_name, reclassify_empty_search, NO_RESULTS_TAG, SEARCH_COMMANDS,
};
pub use summary::compose_summary;
pub use synthesize::{expand_home, VAR_ANSWER, VAR_PATH, VAR_SAVED_PATH};

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::FlowError;
use crate::executor::{CommandExecutor, ExecRequest, ExecResponse};
use crate::graph::{Node, RunContext};
use crate::llm::LlmBackend;
use crate::progress::ProgressEvent;
use crate::settings::Settings;
use crate::state::{
    BrowserSessionContext, Outcome, Phase, Skill, SkillStep, StateChange, StateUpdate,
    StepResult, WorkflowState,
};
use crate::template::{has_placeholders, substitute_args};
use crate::trace::truncate_for_display;

/// Stage id of the dispatcher in the workflow graph.
pub const DISPATCHER_STAGE: &str = "dispatcher";

/// Output characters carried by a StepSuccess event.
const EVENT_OUTPUT_CHARS: usize = 200;

/// Step arg holding the timeout a step was planned with, set once recovery starts raising it.
/// Never sent to the executor.
pub const BASE_TIMEOUT_ARG: &str = "base_timeout_ms";

/// Timeout of a step: its `timeout_ms` arg (number or numeric string), else `default_ms`.
pub fn step_timeout_ms(args: &Map<String, Value>, default_ms: u64) -> u64 {
    match args.get("timeout_ms") {
        Some(Value::Number(n)) => n.as_u64().filter(|v| *v > 0).unwrap_or(default_ms),
        Some(Value::String(s)) => s.trim().parse().ok().filter(|v| *v > 0).unwrap_or(default_ms),
        _ => default_ms,
    }
}

/// `dispatcher` stage.
pub struct DispatcherNode {
    executor: Arc<dyn CommandExecutor>,
    llm: Arc<dyn LlmBackend>,
    settings: Arc<Settings>,
}

impl DispatcherNode {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        llm: Arc<dyn LlmBackend>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            executor,
            llm,
            settings,
        }
    }

    fn complete(&self, state: &WorkflowState, ctx: &RunContext) -> StateUpdate {
        let summary = compose_summary(state);
        tracing::info!(steps = state.plan.len(), results = state.skill_results.len(), "plan complete");
        ctx.emit(ProgressEvent::Complete {
            outcome: Outcome::Succeeded.as_str().to_string(),
            summary: summary.clone(),
        });
        StateUpdate::from(vec![
            StateChange::SetSummary(Some(summary.clone())),
            StateChange::SetFinalAnswer(Some(summary)),
            StateChange::SetFailedStep(None),
            StateChange::SetTaskComplete(true),
            StateChange::SetPhase(Phase::Succeeded),
        ])
    }

    async fn execute_step(&self, state: &WorkflowState, step: &SkillStep, index: usize) -> StepResult {
        let mut args = substitute_args(&step.args, &state.substitutions);
        args.remove(BASE_TIMEOUT_ARG);
        if has_placeholders(&args) {
            tracing::warn!(index, skill = %step.skill, "step still has unresolved placeholders");
        }
        let timeout_ms = step_timeout_ms(&args, self.settings.step_timeout_ms);
        let request = ExecRequest {
            skill: step.skill,
            args,
        };
        let started = Instant::now();
        let outcome = self
            .executor
            .execute(&request, Duration::from_millis(timeout_ms))
            .await;
        let elapsed = started.elapsed().as_millis() as u64;

        let step = SkillStep {
            args: request.args,
            ..step.clone()
        };
        let mut result = match outcome {
            Ok(response) => result_from_response(index, &step, response, elapsed),
            Err(e) => {
                tracing::warn!(index, skill = %step.skill, error = %e, "executor call failed");
                let message = match e {
                    FlowError::Executor(m) => m,
                    other => other.to_string(),
                };
                let mut r = StepResult::failure(index, &step, message);
                r.execution_time_ms = elapsed;
                r
            }
        };
        if reclassify_empty_search(&mut result, &self.settings.search_commands) {
            tracing::debug!(index, "empty search result reclassified as failure");
        }
        result
    }
}

/// Maps a service response onto a step result.
fn result_from_response(
    index: usize,
    step: &SkillStep,
    response: ExecResponse,
    elapsed_ms: u64,
) -> StepResult {
    let stderr = response.stderr.unwrap_or_default();
    let error = if response.ok {
        response.error
    } else {
        response.error.or_else(|| {
            let first = stderr.lines().find(|l| !l.trim().is_empty());
            Some(match (first, response.exit_code) {
                (Some(line), _) => line.trim().to_string(),
                (None, Some(code)) => format!("step failed with exit code {}", code),
                (None, None) => "step failed".to_string(),
            })
        })
    };
    let result = match (response.result, response.session_id) {
        (Some(Value::Object(mut obj)), Some(session)) => {
            obj.entry("session_id").or_insert(Value::String(session));
            Some(Value::Object(obj))
        }
        (None, Some(session)) => Some(serde_json::json!({ "session_id": session })),
        (other, _) => other,
    };
    StepResult {
        step_index: index,
        skill: step.skill,
        args: step.args.clone(),
        description: step.description.clone(),
        ok: response.ok,
        stdout: response.stdout.unwrap_or_default(),
        stderr,
        exit_code: response.exit_code,
        result,
        url: response.url,
        error,
        execution_time_ms: response.execution_time_ms.unwrap_or(elapsed_ms),
    }
}

/// Browser context after a successful browser step, or `None` when unchanged.
fn browser_after(current: &BrowserSessionContext, result: &StepResult) -> Option<BrowserSessionContext> {
    if result.skill != Skill::BrowserAct || !result.ok {
        return None;
    }
    let action = result
        .args
        .get("action")
        .and_then(Value::as_str)
        .map(|a| a.trim().to_lowercase());
    if action.as_deref() == Some("close") {
        return Some(BrowserSessionContext::default());
    }
    let session = result
        .result
        .as_ref()
        .and_then(|r| r.get("session_id"))
        .and_then(Value::as_str)
        .or_else(|| result.args.get("session_id").and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| current.active_session_id.clone());
    let url = result
        .url
        .clone()
        .or_else(|| {
            result
                .args
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| current.active_url.clone());
    let next = BrowserSessionContext {
        active_session_id: session,
        active_url: url,
    };
    (next != *current).then_some(next)
}

#[async_trait]
impl Node<WorkflowState> for DispatcherNode {
    fn id(&self) -> &str {
        DISPATCHER_STAGE
    }

    async fn run(&self, state: &WorkflowState, ctx: &RunContext) -> Result<StateUpdate, FlowError> {
        let index = state.skill_cursor;
        let Some(step) = state.current_step() else {
            return Ok(self.complete(state, ctx));
        };
        ctx.emit(ProgressEvent::StepStart {
            index,
            skill: step.skill.to_string(),
            description: step.description.clone(),
        });
        tracing::debug!(index, skill = %step.skill, attempt = state.attempts_for(index) + 1, "dispatching step");

        let mut update = StateUpdate::new();
        let result = if step.skill == Skill::Synthesize {
            let out = synthesize::run_synthesis(&self.llm, state, step, index, ctx).await;
            for (name, value) in out.vars {
                update.push(StateChange::SetVar { name, value });
            }
            out.result
        } else {
            self.execute_step(state, step, index).await
        };

        if result.ok || step.optional {
            if result.ok {
                ctx.emit(ProgressEvent::StepSuccess {
                    index,
                    skill: step.skill.to_string(),
                    description: step.description.clone(),
                    output: truncate_for_display(&result.output_text(), EVENT_OUTPUT_CHARS),
                });
            } else {
                tracing::info!(index, "optional step failed, continuing");
                ctx.emit(step_failure_event(&result, true));
            }
            if let Some(browser) = browser_after(&state.browser, &result) {
                update.push(StateChange::SetBrowser(browser));
            }
            update.push(StateChange::PushResult(result));
            update.push(StateChange::SetCursor(index + 1));
            update.push(StateChange::SetFailedStep(None));
            update.push(StateChange::SetRetryCount(0));
            update.push(StateChange::SetPatchCount(0));
            update.push(StateChange::SetPhase(Phase::Executing));
        } else {
            tracing::info!(
                index,
                skill = %step.skill,
                error = %result.error.as_deref().unwrap_or(""),
                "step failed"
            );
            ctx.emit(step_failure_event(&result, false));
            update.push(StateChange::PushResult(result.clone()));
            update.push(StateChange::SetFailedStep(Some(result)));
            update.push(StateChange::SetPhase(Phase::Recovering));
        }
        Ok(update)
    }
}

fn step_failure_event(result: &StepResult, optional: bool) -> ProgressEvent {
    ProgressEvent::StepFailure {
        index: result.step_index,
        skill: result.skill.to_string(),
        description: result.description.clone(),
        error: truncate_for_display(result.error.as_deref().unwrap_or("step failed"), 300),
        optional,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedExecutor;
    use crate::graph::GraphState;
    use crate::llm::MockLlm;
    use serde_json::json;

    fn shell(command: &str) -> SkillStep {
        let mut args = Map::new();
        args.insert("command".into(), json!(command));
        SkillStep::new(Skill::ShellRun, args, command)
    }

    fn node(executor: ScriptedExecutor) -> (DispatcherNode, Arc<ScriptedExecutor>) {
        let executor = Arc::new(executor);
        let node = DispatcherNode::new(
            executor.clone(),
            Arc::new(MockLlm::unavailable()),
            Arc::new(Settings::default()),
        );
        (node, executor)
    }

    fn state_with(plan: Vec<SkillStep>) -> WorkflowState {
        let mut state = WorkflowState::new("task", vec![]);
        state.plan = plan;
        state
    }

    #[test]
    fn step_timeout_reads_number_or_string() {
        let mut args = Map::new();
        assert_eq!(step_timeout_ms(&args, 30_000), 30_000);
        args.insert("timeout_ms".into(), json!(5000));
        assert_eq!(step_timeout_ms(&args, 30_000), 5000);
        args.insert("timeout_ms".into(), json!("7000"));
        assert_eq!(step_timeout_ms(&args, 30_000), 7000);
        args.insert("timeout_ms".into(), json!(0));
        assert_eq!(step_timeout_ms(&args, 30_000), 30_000);
    }

    #[tokio::test]
    async fn success_advances_cursor() {
        let (node, executor) = node(ScriptedExecutor::new([ExecResponse::success("ok")]));
        let mut state = state_with(vec![shell("echo ok"), shell("echo two")]);
        let update = node.run(&state, &RunContext::default()).await.unwrap();
        state.apply_update(update);
        assert_eq!(state.skill_cursor, 1);
        assert!(state.failed_step.is_none());
        assert_eq!(state.skill_results.len(), 1);
        assert_eq!(executor.timeouts()[0], Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn hard_failure_keeps_cursor_and_sets_failed_step() {
        let (node, _) = node(ScriptedExecutor::new([ExecResponse::failure("permission denied")
            .with_exit_code(1)]));
        let mut state = state_with(vec![shell("mkdir /root/x")]);
        let update = node.run(&state, &RunContext::default()).await.unwrap();
        state.apply_update(update);
        assert_eq!(state.skill_cursor, 0);
        assert_eq!(state.phase, Phase::Recovering);
        let failed = state.failed_step.unwrap();
        assert_eq!(failed.error.as_deref(), Some("permission denied"));
    }

    #[tokio::test]
    async fn optional_failure_advances() {
        let (node, _) = node(ScriptedExecutor::new([ExecResponse::failure("nope")]));
        let mut state = state_with(vec![shell("open -a Foo").optional(), shell("ls")]);
        let update = node.run(&state, &RunContext::default()).await.unwrap();
        state.apply_update(update);
        assert_eq!(state.skill_cursor, 1);
        assert!(state.failed_step.is_none());
        assert!(!state.skill_results[0].ok);
    }

    #[tokio::test]
    async fn unreachable_executor_is_a_failed_result() {
        let (node, _) = node(ScriptedExecutor::new([]).then_error("executor unreachable: refused"));
        let mut state = state_with(vec![shell("ls")]);
        let update = node.run(&state, &RunContext::default()).await.unwrap();
        state.apply_update(update);
        let failed = state.failed_step.unwrap();
        assert!(failed.error.unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn placeholders_are_substituted_before_dispatch() {
        let (node, executor) = node(ScriptedExecutor::new([ExecResponse::success("")]));
        let mut state = state_with(vec![shell("cat {{synthesisPath}}")]);
        state
            .substitutions
            .insert(VAR_PATH.to_string(), "/tmp/s.md".to_string());
        node.run(&state, &RunContext::default()).await.unwrap();
        assert_eq!(executor.requests()[0].args["command"], json!("cat /tmp/s.md"));
    }

    #[tokio::test]
    async fn base_timeout_stays_out_of_the_request() {
        let (node, executor) = node(ScriptedExecutor::new([ExecResponse::success("")]));
        let mut step = shell("./export.sh");
        step.args.insert("timeout_ms".into(), json!(8000));
        step.args.insert(BASE_TIMEOUT_ARG.into(), json!(4000));
        let state = state_with(vec![step]);
        node.run(&state, &RunContext::default()).await.unwrap();
        let requests = executor.requests();
        assert!(requests[0].args.get(BASE_TIMEOUT_ARG).is_none());
        assert_eq!(executor.timeouts()[0], Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn browser_success_updates_session() {
        let (node, _) = node(ScriptedExecutor::new([ExecResponse {
            session_id: Some("s1".into()),
            ..ExecResponse::success("").with_url("https://example.com/")
        }]));
        let mut args = Map::new();
        args.insert("action".into(), json!("navigate"));
        args.insert("url".into(), json!("https://example.com"));
        let mut state = state_with(vec![SkillStep::new(Skill::BrowserAct, args, "open")]);
        let update = node.run(&state, &RunContext::default()).await.unwrap();
        state.apply_update(update);
        assert_eq!(state.browser.active_session_id.as_deref(), Some("s1"));
        assert_eq!(state.browser.active_url.as_deref(), Some("https://example.com/"));
    }

    #[tokio::test]
    async fn cursor_at_end_completes_task() {
        let (node, executor) = node(ScriptedExecutor::new([]));
        let mut state = state_with(vec![shell("ls")]);
        state.skill_cursor = 1;
        let update = node.run(&state, &RunContext::default()).await.unwrap();
        state.apply_update(update);
        assert!(state.task_complete);
        assert_eq!(state.phase, Phase::Succeeded);
        assert!(state.summary.is_some());
        assert_eq!(executor.call_count(), 0);
    }
}
