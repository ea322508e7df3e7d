//! Engine and external-boundary error types.
//!
//! Step failures are not errors: they are recorded as `StepResult { ok: false }` and routed
//! through recovery. `FlowError` covers the stage bodies, the LLM backend and the
//! command-execution service.

use thiserror::Error;

/// Error returned by a stage body or an external collaborator.
///
/// Stages return it from `Node::run`; the engine records it in the trace and in the
/// state's error field and halts the run.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Routing produced more stage executions than the configured cap.
    #[error("workflow exceeded {limit} stage executions")]
    LoopLimit { limit: usize },

    /// A computed route named a stage that is not registered.
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    /// No usable LLM backend (placeholder backend, or backend reports unavailable).
    #[error("llm backend unavailable: {0}")]
    BackendUnavailable(String),

    /// LLM backend call failed.
    #[error("llm error: {0}")]
    Llm(String),

    /// Command-execution service call failed (unreachable, bad response, local timeout).
    #[error("executor error: {0}")]
    Executor(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
