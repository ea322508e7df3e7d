//! Protocol-level event types (type + payload).
//! Plan outlines use `serde_json::Value`; the bridge in stepflow serializes its outline into that.

use serde::Serialize;
use serde_json::Value;

/// Protocol event: wire shape for one progress event (type + payload).
/// The envelope (session_id, stage_id, event_id) is applied separately.
///
/// Note on naming:
/// - `id` in payload means stage name (e.g. "planner", "dispatcher")
/// - `stage_id` in envelope means stage-run span id
/// - `index` is the zero-based plan step index
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    StageEnter { id: String },
    StageExit {
        id: String,
        ok: bool,
        duration_ms: u64,
    },
    PlanStart { request: String, replan: bool },
    PlanReady { step_count: usize, steps: Value },
    PlanError { message: String },
    StepStart {
        index: usize,
        skill: String,
        description: String,
    },
    StepSuccess {
        index: usize,
        skill: String,
        output: String,
    },
    StepFailure {
        index: usize,
        skill: String,
        error: String,
        optional: bool,
    },
    MessageChunk { content: String, id: String },
    Recovery {
        index: usize,
        decision: String,
        detail: String,
        fast_path: bool,
    },
    Complete { outcome: String, summary: String },
}

impl ProtocolEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    ///
    /// Use crate-level [`crate::to_json`] when you need envelope fields injected.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// True for the event that ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProtocolEvent::Complete { .. })
    }
}
