//! Plan generation: natural-language request in, validated [`SkillPlan`] out.
//!
//! [`Planner::plan`] builds one prompt (see [`prompt`]), asks the LLM, and parses the answer
//! with [`parse`]. Unparseable output is retried once with the same prompt; a refusal with
//! an empty or boilerplate reason is retried once with an enriched prompt. A successful
//! plan then goes through browser session reuse ([`session`]).
//!
//! [`PlannerNode`] wraps the planner as the `planner` stage of the workflow.

pub mod parse;
pub mod prompt;
pub mod session;

pub use parse::{parse_plan, ParsedPlan, PlanError};
pub use prompt::{build_plan_prompt, PlanInput, PLANNER_SYSTEM};
pub use session::{canonical_domain, normalize_sessions};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FlowError;
use crate::graph::{Node, RunContext};
use crate::llm::{GenerateOptions, LlmBackend};
use crate::progress::{ProgressEvent, StepOutline};
use crate::state::{Phase, SkillPlan, StateChange, StateUpdate, WorkflowState};

/// Stage id of the planner in the workflow graph.
pub const PLANNER_STAGE: &str = "planner";

/// Turns requests into plans through an LLM backend.
#[derive(Clone)]
pub struct Planner {
    llm: Arc<dyn LlmBackend>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    /// Produces a plan for `input`, or the reason no plan could be produced.
    pub async fn plan(&self, input: &PlanInput<'_>) -> Result<SkillPlan, PlanError> {
        if !self.llm.is_available() {
            return Err(PlanError::Backend(format!(
                "{} is not available",
                self.llm.info().name
            )));
        }
        let options = GenerateOptions::default().with_system(PLANNER_SYSTEM);
        let mut enriched = false;
        let mut parse_retried = false;

        loop {
            let prompt = build_plan_prompt(input, enriched);
            let raw = self
                .llm
                .generate_answer(&prompt, &Value::Null, &options, None)
                .await
                .map_err(|e| PlanError::Backend(e.to_string()))?;

            match parse_plan(&raw) {
                ParsedPlan::Steps(mut plan) => {
                    if plan.is_empty() {
                        return Err(PlanError::Empty);
                    }
                    normalize_sessions(&mut plan, input.browser);
                    if plan.is_empty() {
                        return Err(PlanError::Empty);
                    }
                    tracing::debug!(steps = plan.len(), enriched, "plan ready");
                    return Ok(plan);
                }
                ParsedPlan::Unparseable if !parse_retried => {
                    tracing::warn!("planner output unparseable, retrying once");
                    parse_retried = true;
                }
                ParsedPlan::Unparseable => return Err(PlanError::Unparseable),
                ParsedPlan::Refusal {
                    templated: true, ..
                } if !enriched => {
                    tracing::warn!("planner refused without a reason, retrying with enriched prompt");
                    enriched = true;
                }
                ParsedPlan::Refusal { reason, .. } => {
                    let reason = if reason.is_empty() {
                        "no reason was given".to_string()
                    } else {
                        reason
                    };
                    return Err(PlanError::Refused { reason });
                }
            }
        }
    }
}

/// `planner` stage: plans (or replans) and resets execution.
pub struct PlannerNode {
    planner: Planner,
}

impl PlannerNode {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self {
            planner: Planner::new(llm),
        }
    }
}

#[async_trait]
impl Node<WorkflowState> for PlannerNode {
    fn id(&self) -> &str {
        PLANNER_STAGE
    }

    async fn run(&self, state: &WorkflowState, ctx: &RunContext) -> Result<StateUpdate, FlowError> {
        ctx.emit(ProgressEvent::PlanStart {
            request: state.request.clone(),
            replan: state.recovery_context.is_some(),
        });
        let input = PlanInput {
            request: &state.request,
            recovery: state.recovery_context.as_ref(),
            prior_results: &state.skill_results,
            conversation: &state.conversation,
            browser: &state.browser,
        };

        match self.planner.plan(&input).await {
            Ok(plan) => {
                ctx.emit(ProgressEvent::PlanReady {
                    steps: plan
                        .iter()
                        .enumerate()
                        .map(|(index, s)| StepOutline {
                            index,
                            skill: s.skill.to_string(),
                            description: s.description.clone(),
                            optional: s.optional,
                        })
                        .collect(),
                });
                Ok(StateUpdate::from(vec![
                    StateChange::SetPlan(plan),
                    StateChange::SetCursor(0),
                    StateChange::SetRecoveryContext(None),
                    StateChange::SetFailedStep(None),
                    StateChange::SetRetryCount(0),
                    StateChange::SetPatchCount(0),
                    StateChange::SetPlanError(None),
                    StateChange::SetPhase(Phase::Executing),
                ]))
            }
            Err(err) => {
                tracing::warn!(error = %err, "planning failed");
                let message = err.user_message();
                ctx.emit(ProgressEvent::PlanError {
                    message: message.clone(),
                });
                Ok(StateUpdate::from(vec![
                    StateChange::ClearPlan,
                    StateChange::SetPlanError(Some(err.to_string())),
                    StateChange::SetFinalAnswer(Some(message)),
                    StateChange::SetTaskComplete(false),
                    StateChange::SetPhase(Phase::Failed),
                ]))
            }
        }
    }
}
