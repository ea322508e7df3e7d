//! Partial updates returned by workflow stages.
//!
//! A stage returns a [`StateUpdate`]: an ordered list of [`StateChange`] operations that
//! `WorkflowState::apply_update` folds into the state. Operations are applied in order, so
//! `SetPlan` followed by `SetCursor(0)` behaves as written.

use serde_json::{Map, Value};

use super::{
    BrowserSessionContext, PendingQuestion, Phase, RecoveryContext, SkillPlan, StepResult,
};

/// One state operation.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Replace the plan.
    SetPlan(SkillPlan),
    /// Drop the plan entirely.
    ClearPlan,
    /// Move the cursor; clamped to the plan length.
    SetCursor(usize),
    /// Append one dispatch attempt.
    PushResult(StepResult),
    SetFailedStep(Option<StepResult>),
    SetRecoveryContext(Option<RecoveryContext>),
    SetRetryCount(u32),
    SetPatchCount(u32),
    /// Merge args into the step at `index`; ignored when out of range.
    PatchStepArgs {
        index: usize,
        args: Map<String, Value>,
    },
    SetBrowser(BrowserSessionContext),
    /// Substitution variable visible to later steps' args.
    SetVar {
        name: String,
        value: String,
    },
    SetPendingQuestion(Option<PendingQuestion>),
    SetFinalAnswer(Option<String>),
    SetSummary(Option<String>),
    SetTaskComplete(bool),
    SetPlanError(Option<String>),
    SetSearchScope(u32),
    /// Count one more occurrence of a recovery rule.
    BumpOccurrence(String),
    IncrementReplans,
    SetPhase(Phase),
}

/// Ordered list of changes returned by one stage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateUpdate {
    pub changes: Vec<StateChange>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a change; chainable.
    pub fn with(mut self, change: StateChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn push(&mut self, change: StateChange) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl From<Vec<StateChange>> for StateUpdate {
    fn from(changes: Vec<StateChange>) -> Self {
        Self { changes }
    }
}
