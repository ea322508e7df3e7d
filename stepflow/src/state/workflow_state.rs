//! The single state object threaded through planner, dispatcher and recovery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::FlowError;
use crate::graph::GraphState;
use crate::message::Message;
use crate::trace::{bounded_snapshot, truncate_for_display, ExecutionTrace};

use super::{
    BrowserSessionContext, PendingQuestion, RecoveryContext, SkillPlan, StateChange, StateUpdate,
    StepResult,
};

/// Message shown when the engine halts on its own (loop limit, stage error).
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Something went wrong internally while working on this task, so it was stopped. \
     Please try again, or rephrase the request.";

/// Where the task stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Planning,
    Executing,
    Recovering,
    Succeeded,
    AwaitingUser,
    Failed,
}

/// How a finished run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    AwaitingUser,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::AwaitingUser => "awaiting_user",
            Outcome::Failed => "failed",
        }
    }
}

/// State of one user request.
///
/// Owned by the engine during a run; serializable so a caller can resume after a
/// clarification question.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub request: String,
    #[serde(default)]
    pub conversation: Vec<Message>,
    #[serde(default)]
    pub plan: SkillPlan,
    /// Index of the next step to dispatch; never exceeds `plan.len()`.
    #[serde(default)]
    pub skill_cursor: usize,
    /// Every dispatch attempt, in order.
    #[serde(default)]
    pub skill_results: Vec<StepResult>,
    /// Most recent hard failure; routes to recovery while set.
    #[serde(default)]
    pub failed_step: Option<StepResult>,
    #[serde(default)]
    pub recovery_context: Option<RecoveryContext>,
    /// Timeout retries of the current step.
    #[serde(default)]
    pub step_retry_count: u32,
    /// LLM-issued patches of the current step.
    #[serde(default)]
    pub step_patch_count: u32,
    #[serde(default)]
    pub browser: BrowserSessionContext,
    /// Substitution variables for `{{name}}` placeholders in step args.
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,
    #[serde(default)]
    pub pending_question: Option<PendingQuestion>,
    #[serde(default)]
    pub final_answer: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub task_complete: bool,
    #[serde(default)]
    pub plan_error: Option<String>,
    /// Internal error detail (engine halts); the user sees `final_answer`.
    #[serde(default)]
    pub error: Option<String>,
    /// How far search recoveries have widened the scope.
    #[serde(default)]
    pub search_scope_level: u32,
    /// Occurrences per recovery rule tag; survives replans.
    #[serde(default)]
    pub recovery_occurrences: BTreeMap<String, u32>,
    #[serde(default)]
    pub replan_count: u32,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing)]
    pub trace: ExecutionTrace,
}

impl WorkflowState {
    pub fn new(request: impl Into<String>, conversation: Vec<Message>) -> Self {
        Self {
            request: request.into(),
            conversation,
            ..Self::default()
        }
    }

    /// Step at the cursor, if any remain.
    pub fn current_step(&self) -> Option<&super::SkillStep> {
        self.plan.get(self.skill_cursor)
    }

    pub fn occurrences(&self, tag: &str) -> u32 {
        self.recovery_occurrences.get(tag).copied().unwrap_or(0)
    }

    /// Number of attempts recorded for step `index`.
    pub fn attempts_for(&self, index: usize) -> usize {
        self.skill_results
            .iter()
            .filter(|r| r.step_index == index)
            .count()
    }

    pub fn outcome(&self) -> Outcome {
        if self.error.is_some() || self.plan_error.is_some() {
            return Outcome::Failed;
        }
        match self.phase {
            Phase::Succeeded => Outcome::Succeeded,
            Phase::AwaitingUser => Outcome::AwaitingUser,
            _ => Outcome::Failed,
        }
    }

    /// Re-enters planning with the user's reply to the pending question.
    ///
    /// The question and reply are appended to the conversation and handed to the planner
    /// as recovery guidance. Results already recorded are kept; the plan is rebuilt.
    pub fn resume_with_reply(&mut self, reply: impl Into<String>) {
        let reply = reply.into();
        let (question, failed_skill, reason) = match self.pending_question.take() {
            Some(q) => (q.render(), q.failed_skill, q.reason),
            None => (
                self.final_answer.clone().unwrap_or_default(),
                None,
                String::new(),
            ),
        };
        if !question.is_empty() {
            self.conversation.push(Message::assistant(question));
        }
        self.conversation.push(Message::user(reply.clone()));
        self.recovery_context = Some(RecoveryContext {
            failed_skill,
            failure_reason: reason,
            suggestion: format!("The user replied: {}", reply),
            alternative_cwd: None,
            constraint: None,
        });
        self.plan.clear();
        self.skill_cursor = 0;
        self.failed_step = None;
        self.step_retry_count = 0;
        self.step_patch_count = 0;
        self.final_answer = None;
        self.summary = None;
        self.task_complete = false;
        self.plan_error = None;
        self.error = None;
        self.recovery_occurrences.clear();
        self.replan_count = 0;
        self.phase = Phase::Planning;
    }

    /// Fresh state for the next request in the same conversation.
    ///
    /// The finished exchange moves into the conversation; the browser session and
    /// substitution variables carry over so follow-ups can reuse them.
    pub fn follow_up(self, request: impl Into<String>) -> Self {
        let mut conversation = self.conversation;
        conversation.push(Message::user(self.request));
        if let Some(answer) = self.final_answer {
            conversation.push(Message::assistant(answer));
        }
        Self {
            browser: self.browser,
            substitutions: self.substitutions,
            ..Self::new(request, conversation)
        }
    }

    fn apply_change(&mut self, change: StateChange) {
        match change {
            StateChange::SetPlan(plan) => {
                self.plan = plan;
                self.skill_cursor = self.skill_cursor.min(self.plan.len());
            }
            StateChange::ClearPlan => {
                self.plan.clear();
                self.skill_cursor = 0;
            }
            StateChange::SetCursor(cursor) => self.skill_cursor = cursor.min(self.plan.len()),
            StateChange::PushResult(result) => self.skill_results.push(result),
            StateChange::SetFailedStep(step) => self.failed_step = step,
            StateChange::SetRecoveryContext(ctx) => self.recovery_context = ctx,
            StateChange::SetRetryCount(n) => self.step_retry_count = n,
            StateChange::SetPatchCount(n) => self.step_patch_count = n,
            StateChange::PatchStepArgs { index, args } => {
                if let Some(step) = self.plan.get_mut(index) {
                    *step = step.patched(&args);
                }
            }
            StateChange::SetBrowser(browser) => self.browser = browser,
            StateChange::SetVar { name, value } => {
                self.substitutions.insert(name, value);
            }
            StateChange::SetPendingQuestion(q) => self.pending_question = q,
            StateChange::SetFinalAnswer(a) => self.final_answer = a,
            StateChange::SetSummary(s) => self.summary = s,
            StateChange::SetTaskComplete(done) => self.task_complete = done,
            StateChange::SetPlanError(e) => self.plan_error = e,
            StateChange::SetSearchScope(level) => self.search_scope_level = level,
            StateChange::BumpOccurrence(tag) => {
                *self.recovery_occurrences.entry(tag).or_insert(0) += 1;
            }
            StateChange::IncrementReplans => self.replan_count += 1,
            StateChange::SetPhase(phase) => self.phase = phase,
        }
    }
}

impl GraphState for WorkflowState {
    type Update = StateUpdate;

    fn apply_update(&mut self, update: StateUpdate) {
        for change in update.changes {
            self.apply_change(change);
        }
    }

    fn trace_snapshot(&self, max_chars: usize) -> Value {
        let current = self
            .current_step()
            .map(|s| json!({"skill": s.skill, "description": s.description}));
        let failed = self.failed_step.as_ref().map(|f| {
            json!({
                "index": f.step_index,
                "skill": f.skill,
                "error": f.error.as_deref().map(|e| truncate_for_display(e, 200)),
            })
        });
        let snapshot = json!({
            "phase": self.phase,
            "plan_len": self.plan.len(),
            "skill_cursor": self.skill_cursor,
            "results": self.skill_results.len(),
            "current_step": current,
            "failed_step": failed,
            "step_retry_count": self.step_retry_count,
            "replan_count": self.replan_count,
            "active_session": self.browser.active_session_id,
            "pending_question": self.pending_question.as_ref().map(|q| &q.question),
        });
        bounded_snapshot(&snapshot, max_chars)
    }

    fn trace_mut(&mut self) -> &mut ExecutionTrace {
        &mut self.trace
    }

    fn record_engine_error(&mut self, error: &FlowError) {
        self.error = Some(error.to_string());
        self.final_answer = Some(INTERNAL_ERROR_MESSAGE.to_string());
        self.task_complete = false;
        self.phase = Phase::Failed;
    }
}
