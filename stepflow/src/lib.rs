//! # Stepflow
//!
//! Plan, dispatch and recover multi-step automation tasks on a small state graph.
//! A natural-language request becomes a typed plan of skill steps (shell, file and browser
//! actions plus an LLM synthesis step); each step runs through an external command-execution
//! service; failures are classified and resolved by patching the step, replanning, or asking
//! the user a clarification question.
//!
//! ## Design principles
//!
//! - **Single state type**: one [`WorkflowState`] flows through every stage; stages return a
//!   [`StateUpdate`] the engine applies in order.
//! - **Computed routing**: each stage's successor is decided from the state after its update,
//!   through conditional edges on a [`StateGraph`].
//! - **Never crash the caller**: the engine returns the final state in every case. A stage
//!   error or the iteration cap is recorded in `state.error` with a generic user message.
//! - **Pluggable collaborators**: [`LlmBackend`] and [`CommandExecutor`] are traits;
//!   [`MockLlm`] and [`ScriptedExecutor`] drive the tests.
//!
//! ## Main modules
//!
//! - [`graph`]: [`StateGraph`], [`CompiledStateGraph`], [`Node`], [`RunContext`]: build and run state graphs.
//! - [`state`]: [`WorkflowState`], [`SkillStep`], [`StepResult`], [`RecoveryDecision`], [`StateChange`].
//! - [`planner`]: prompt, tolerant plan parsing, browser session normalization, [`PlannerNode`].
//! - [`dispatcher`]: step execution, search reclassification, synthesis, [`DispatcherNode`].
//! - [`recovery`]: fast-path rules, LLM-reasoned decisions, [`RecoveryNode`].
//! - [`llm`]: [`LlmBackend`], [`OpenAiCompatible`], [`PlaceholderLlm`], [`resolve_backend`].
//! - [`executor`]: [`CommandExecutor`], [`HttpExecutor`].
//! - [`progress`]: [`ProgressEvent`], [`ProgressWriter`]; [`export`] bridges to the `stream-event` wire shape.
//! - [`workflow`]: [`build_workflow`] and [`TaskRunner`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use stepflow::{ProgressWriter, Settings, TaskRunner};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), stepflow::FlowError> {
//! let runner = TaskRunner::from_settings(Settings::from_env(), None)?;
//! let state = runner
//!     .run("list the files in my downloads folder", vec![], ProgressWriter::noop())
//!     .await;
//! println!("{}", state.final_answer.unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! A run that ends with a pending question is continued with [`TaskRunner::resume`]:
//!
//! ```rust
//! use stepflow::{Message, Phase, WorkflowState};
//!
//! let mut state = WorkflowState::new("create a folder in /root", vec![]);
//! state.phase = Phase::AwaitingUser;
//! state.resume_with_reply("Use ~/stepflow-output");
//! assert_eq!(state.phase, Phase::Planning);
//! assert!(matches!(state.conversation.last(), Some(Message::User(_))));
//! ```

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod export;
pub mod graph;
pub mod json_extract;
pub mod llm;
pub mod message;
pub mod planner;
pub mod progress;
pub mod recovery;
pub mod settings;
pub mod state;
pub mod template;
pub mod trace;
pub mod workflow;

pub use dispatcher::{compose_summary, DispatcherNode, DISPATCHER_STAGE};
pub use error::FlowError;
pub use executor::{CommandExecutor, ExecRequest, ExecResponse, HttpExecutor, ScriptedExecutor};
pub use export::{to_protocol_event, to_protocol_value, EnvelopeState, ProtocolEvent};
pub use graph::{
    CompilationError, CompiledStateGraph, GraphState, Node, RouteFn, RunContext, StateGraph, END,
    START,
};
pub use llm::{
    resolve_backend, BackendInfo, BackendKind, GenerateOptions, LlmBackend, MockLlm,
    OpenAiCompatible, PlaceholderLlm, TokenChunk,
};
pub use message::Message;
pub use planner::{PlanError, Planner, PlannerNode, PLANNER_STAGE};
pub use progress::{ProgressEvent, ProgressWriter, StepOutline};
pub use recovery::{apply_decision, RecoveryEngine, RecoveryNode, RECOVERY_STAGE};
pub use settings::{BackendMode, LlmSettings, Settings};
pub use state::{
    BrowserSessionContext, Outcome, PendingQuestion, Phase, RecoveryContext, RecoveryDecision,
    Skill, SkillPlan, SkillStep, StateChange, StateUpdate, StepResult, WorkflowState,
};
pub use trace::{ExecutionTrace, TraceEntry};
pub use workflow::{build_workflow, TaskRunner, WorkflowDeps};
