//! State types for the plan / dispatch / recover cycle.
//!
//! The workflow state flows through [`StateGraph`](crate::graph::StateGraph) and is read by
//! the planner, dispatcher and recovery stages, which return [`StateUpdate`]s.
//!
//! # Main types
//!
//! - [`WorkflowState`]: request, plan, cursor, append-only results and recovery bookkeeping.
//! - [`SkillStep`] / [`SkillPlan`]: structured actions produced by the planner.
//! - [`StepResult`]: one dispatch attempt.
//! - [`RecoveryDecision`]: AutoPatch, Replan or AskUser.
//!
//! # Example
//!
//! ```rust
//! use stepflow::{Message, Phase, WorkflowState};
//!
//! let state = WorkflowState::new("list my downloads", vec![Message::user("hi")]);
//! assert_eq!(state.phase, Phase::Planning);
//! ```

mod recovery;
mod skill;
mod update;
mod workflow_state;

pub use recovery::{BrowserSessionContext, PendingQuestion, RecoveryContext, RecoveryDecision};
pub use skill::{Skill, SkillPlan, SkillStep, StepResult};
pub use update::{StateChange, StateUpdate};
pub use workflow_state::{Outcome, Phase, WorkflowState, INTERNAL_ERROR_MESSAGE};
