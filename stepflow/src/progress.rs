//! Progress events produced while a workflow runs.
//!
//! A UI or log collector receives a sequence of step-lifecycle events through a
//! [`ProgressWriter`]: enough structured detail to render a live progress list without
//! re-deriving it from raw state.
//!
//! ```rust,ignore
//! let (writer, mut events) = ProgressWriter::channel();
//! tokio::spawn(async move {
//!     while let Some(ev) = events.next().await {
//!         println!("{:?}", ev);
//!     }
//! });
//! runner.run("open example.com", vec![], writer).await;
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Outline of one planned step, as shown in a progress list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepOutline {
    pub index: usize,
    pub skill: String,
    pub description: String,
    pub optional: bool,
}

/// One progress event.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageEnter {
        stage: String,
    },
    StageExit {
        stage: String,
        ok: bool,
        duration_ms: u64,
    },
    PlanStart {
        request: String,
        replan: bool,
    },
    PlanReady {
        steps: Vec<StepOutline>,
    },
    PlanError {
        message: String,
    },
    StepStart {
        index: usize,
        skill: String,
        description: String,
    },
    StepSuccess {
        index: usize,
        skill: String,
        description: String,
        /// Truncated output for display.
        output: String,
    },
    StepFailure {
        index: usize,
        skill: String,
        description: String,
        error: String,
        optional: bool,
    },
    /// Incremental text from the synthesize step when the backend streams.
    SynthesisToken {
        content: String,
    },
    Recovery {
        index: usize,
        /// `auto_patch`, `replan` or `ask_user`.
        decision: String,
        detail: String,
        fast_path: bool,
    },
    Complete {
        /// `succeeded`, `awaiting_user` or `failed`.
        outcome: String,
        summary: String,
    },
}

/// Writer used by stages to emit progress events.
///
/// `Clone + Send + Sync`; a no-op writer drops every event.
#[derive(Clone)]
pub struct ProgressWriter {
    emit_fn: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

impl ProgressWriter {
    pub fn new(emit_fn: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            emit_fn: Arc::new(emit_fn),
        }
    }

    /// Writer that drops every event.
    pub fn noop() -> Self {
        Self {
            emit_fn: Arc::new(|_| {}),
        }
    }

    /// Writer backed by an unbounded channel; events are read from the returned stream.
    ///
    /// Emitting never blocks a stage; events sent after the stream is dropped are discarded.
    pub fn channel() -> (Self, UnboundedReceiverStream<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Self::new(move |ev| {
            let _ = tx.send(ev);
        });
        (writer, UnboundedReceiverStream::new(rx))
    }

    pub fn emit(&self, event: ProgressEvent) {
        (self.emit_fn)(event)
    }
}

impl Default for ProgressWriter {
    fn default() -> Self {
        Self::noop()
    }
}

impl Debug for ProgressWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressWriter")
            .field("emit_fn", &"<fn>")
            .finish()
    }
}
