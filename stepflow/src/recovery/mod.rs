//! Failure recovery: one decision per failed step.
//!
//! [`RecoveryEngine::decide`] tries the [`fast_path`] rules first and only asks the LLM
//! ([`reasoned`]) when none match. An unavailable backend or an unusable answer becomes an
//! `AskUser` with the default options. Replans past `max_replans`, and LLM patches of one
//! step past [`MAX_LLM_PATCHES`], are turned into `AskUser` as well.
//!
//! [`apply_decision`] is the pure reducer that turns a decision into a [`StateUpdate`]:
//!
//! | decision  | plan | cursor | next stage |
//! |-----------|------|--------|------------|
//! | AutoPatch | failing step's args merged | unchanged | dispatcher |
//! | Replan    | cleared, recovery context set | 0 | planner |
//! | AskUser   | kept, pending question set | unchanged | end |

pub mod fast_path;
pub mod reasoned;

pub use fast_path::{match_failure, FailureContext, FastPathMatch};
pub use reasoned::{build_recovery_prompt, parse_decision, RECOVERY_SYSTEM};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FlowError;
use crate::graph::{Node, RunContext};
use crate::llm::{GenerateOptions, LlmBackend};
use crate::progress::ProgressEvent;
use crate::settings::Settings;
use crate::state::{
    Outcome, PendingQuestion, Phase, RecoveryContext, RecoveryDecision, StateChange,
    StateUpdate, StepResult, WorkflowState,
};

/// Stage id of recovery in the workflow graph.
pub const RECOVERY_STAGE: &str = "recovery";

/// LLM-issued patches allowed on one step before asking the user.
pub const MAX_LLM_PATCHES: u32 = 3;

/// Options offered when no more specific ones exist.
pub const DEFAULT_ASK_OPTIONS: [&str; 3] =
    ["Retry the step", "Try a different approach", "Cancel the task"];

/// A decision plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub decision: RecoveryDecision,
    /// Fast-path rule tag, `None` for LLM or default decisions.
    pub rule: Option<&'static str>,
    /// Changes applied after the decision's own.
    pub extra: Vec<StateChange>,
}

/// Chooses recovery decisions.
pub struct RecoveryEngine {
    llm: Arc<dyn LlmBackend>,
    settings: Arc<Settings>,
}

impl RecoveryEngine {
    pub fn new(llm: Arc<dyn LlmBackend>, settings: Arc<Settings>) -> Self {
        Self { llm, settings }
    }

    /// Decision for `failed`, with caps applied.
    pub async fn decide(&self, state: &WorkflowState, failed: &StepResult) -> Resolution {
        let ctx = FailureContext {
            failed,
            step: state.plan.get(failed.step_index),
            state,
            default_timeout_ms: self.settings.step_timeout_ms,
        };
        let mut resolution = match match_failure(&ctx) {
            Some(m) => {
                tracing::debug!(rule = m.tag, decision = m.decision.kind(), "fast-path recovery");
                Resolution {
                    decision: m.decision,
                    rule: Some(m.tag),
                    extra: m.extra,
                }
            }
            None => {
                let decision = self.reason(state, failed).await;
                let mut extra = Vec::new();
                if matches!(decision, RecoveryDecision::AutoPatch { .. }) {
                    if state.step_patch_count >= MAX_LLM_PATCHES {
                        return Resolution {
                            decision: exhausted(
                                failed,
                                "I've already adjusted this step several times without success.",
                            ),
                            rule: None,
                            extra,
                        };
                    }
                    extra.push(StateChange::SetPatchCount(state.step_patch_count + 1));
                }
                Resolution {
                    decision,
                    rule: None,
                    extra,
                }
            }
        };

        if matches!(resolution.decision, RecoveryDecision::Replan { .. })
            && state.replan_count >= self.settings.max_replans
        {
            tracing::warn!(replans = state.replan_count, "replan limit reached, asking user");
            resolution.decision = exhausted(
                failed,
                &format!(
                    "I've re-planned this task {} times without success.",
                    state.replan_count
                ),
            );
            resolution
                .extra
                .retain(|c| matches!(c, StateChange::SetSearchScope(_)));
        }
        resolution
    }

    async fn reason(&self, state: &WorkflowState, failed: &StepResult) -> RecoveryDecision {
        if !self.llm.is_available() {
            tracing::warn!("no llm backend for recovery reasoning, asking user");
            return default_ask(failed);
        }
        let prompt = build_recovery_prompt(state, failed);
        let options = GenerateOptions::default().with_system(RECOVERY_SYSTEM);
        match self
            .llm
            .generate_answer(&prompt, &Value::Null, &options, None)
            .await
        {
            Ok(raw) => parse_decision(&raw).unwrap_or_else(|| {
                tracing::warn!("recovery answer unusable, asking user");
                default_ask(failed)
            }),
            Err(e) => {
                tracing::warn!(error = %e, "recovery reasoning failed, asking user");
                default_ask(failed)
            }
        }
    }
}

/// `AskUser` describing the failure, with [`DEFAULT_ASK_OPTIONS`].
pub fn default_ask(failed: &StepResult) -> RecoveryDecision {
    RecoveryDecision::ask_user(
        format!(
            "{}. How should I continue?",
            fast_path::describe_failure(failed)
        ),
        &DEFAULT_ASK_OPTIONS,
    )
}

fn exhausted(failed: &StepResult, lead: &str) -> RecoveryDecision {
    RecoveryDecision::ask_user(
        format!(
            "{} {}. How should I continue?",
            lead,
            fast_path::describe_failure(failed)
        ),
        &DEFAULT_ASK_OPTIONS,
    )
}

/// Pure reducer: the state changes that carry out `decision` for `failed`.
pub fn apply_decision(decision: &RecoveryDecision, failed: &StepResult) -> StateUpdate {
    match decision {
        RecoveryDecision::AutoPatch { patched_args, .. } => StateUpdate::from(vec![
            StateChange::PatchStepArgs {
                index: failed.step_index,
                args: patched_args.clone(),
            },
            StateChange::SetFailedStep(None),
            StateChange::SetRetryCount(0),
            StateChange::SetPhase(Phase::Executing),
        ]),
        RecoveryDecision::Replan {
            suggestion,
            alternative_cwd,
            constraint,
        } => StateUpdate::from(vec![
            StateChange::ClearPlan,
            StateChange::SetFailedStep(None),
            StateChange::SetRecoveryContext(Some(RecoveryContext {
                failed_skill: Some(failed.skill),
                failure_reason: failed.error.clone().unwrap_or_default(),
                suggestion: suggestion.clone(),
                alternative_cwd: alternative_cwd.clone(),
                constraint: constraint.clone(),
            })),
            StateChange::SetRetryCount(0),
            StateChange::SetPatchCount(0),
            StateChange::IncrementReplans,
            StateChange::SetPhase(Phase::Planning),
        ]),
        RecoveryDecision::AskUser { question, options } => {
            let options = if options.is_empty() {
                DEFAULT_ASK_OPTIONS.iter().map(|o| o.to_string()).collect()
            } else {
                options.clone()
            };
            let pending = PendingQuestion {
                question: question.clone(),
                options,
                failed_skill: Some(failed.skill),
                reason: failed.error.clone().unwrap_or_default(),
            };
            StateUpdate::from(vec![
                StateChange::SetFinalAnswer(Some(pending.render())),
                StateChange::SetPendingQuestion(Some(pending)),
                StateChange::SetFailedStep(None),
                StateChange::SetTaskComplete(false),
                StateChange::SetPhase(Phase::AwaitingUser),
            ])
        }
    }
}

/// `recovery` stage.
pub struct RecoveryNode {
    engine: RecoveryEngine,
}

impl RecoveryNode {
    pub fn new(llm: Arc<dyn LlmBackend>, settings: Arc<Settings>) -> Self {
        Self {
            engine: RecoveryEngine::new(llm, settings),
        }
    }
}

#[async_trait]
impl Node<WorkflowState> for RecoveryNode {
    fn id(&self) -> &str {
        RECOVERY_STAGE
    }

    async fn run(&self, state: &WorkflowState, ctx: &RunContext) -> Result<StateUpdate, FlowError> {
        let Some(failed) = state.failed_step.as_ref() else {
            tracing::warn!("recovery entered without a failed step");
            return Ok(StateUpdate::new().with(StateChange::SetPhase(Phase::Executing)));
        };
        let resolution = self.engine.decide(state, failed).await;
        tracing::info!(
            index = failed.step_index,
            decision = resolution.decision.kind(),
            rule = resolution.rule.unwrap_or("llm"),
            "recovery decision"
        );
        ctx.emit(ProgressEvent::Recovery {
            index: failed.step_index,
            decision: resolution.decision.kind().to_string(),
            detail: resolution.decision.detail(),
            fast_path: resolution.rule.is_some(),
        });

        let mut update = apply_decision(&resolution.decision, failed);
        if let Some(tag) = resolution.rule {
            update.push(StateChange::BumpOccurrence(tag.to_string()));
        }
        for change in resolution.extra {
            update.push(change);
        }
        if let RecoveryDecision::AskUser { .. } = resolution.decision {
            let question = update.changes.iter().find_map(|c| match c {
                StateChange::SetPendingQuestion(Some(q)) => Some(q.render()),
                _ => None,
            });
            ctx.emit(ProgressEvent::Complete {
                outcome: Outcome::AwaitingUser.as_str().to_string(),
                summary: question.unwrap_or_default(),
            });
        }
        Ok(update)
    }
}
