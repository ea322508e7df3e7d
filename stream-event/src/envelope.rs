//! Envelope (session_id, stage_id, event_id) added to every event line.
//! EnvelopeState tracks the current stage run and numbers events.

use crate::event::ProtocolEvent;
use serde_json::Value;

/// Envelope fields carried by each event line.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Session ID; constant within a run.
    pub session_id: Option<String>,
    /// Stage run ID for the current span (from stage_enter to the next stage_enter).
    pub stage_id: Option<String>,
    /// Per-event sequence number; strictly increasing within a stream.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_stage_id(mut self, id: impl Into<String>) -> Self {
        self.stage_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.session_id {
            obj.entry("session_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ref id) = self.stage_id {
            obj.entry("stage_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("event_id")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Envelope state for one run: session id, current stage run id, next event id.
#[derive(Debug)]
pub struct EnvelopeState {
    pub session_id: String,
    pub current_stage_id: String,
    pub stage_run_seq: u64,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            current_stage_id: String::new(),
            stage_run_seq: 0,
            next_event_id: 1,
        }
    }

    fn stage_id(&self) -> &str {
        if self.current_stage_id.is_empty() {
            "run-0"
        } else {
            self.current_stage_id.as_str()
        }
    }

    /// Injects the envelope into the event value and advances state.
    /// On `type == "stage_enter"`, opens a new stage span named after the event's `id`.
    pub fn inject_into(&mut self, value: &mut Value) {
        if value.get("type").and_then(Value::as_str) == Some("stage_enter") {
            let id = value.get("id").and_then(Value::as_str).unwrap_or("");
            self.current_stage_id = format!("run-{}-{}", id, self.stage_run_seq);
            self.stage_run_seq += 1;
        }
        let env = Envelope::new()
            .with_session_id(&self.session_id)
            .with_stage_id(self.stage_id())
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env.inject_into(value);
    }
}

/// Converts a protocol event to JSON and injects the envelope using the given state.
/// Returns the final value (type + payload + session_id, stage_id, event_id).
pub fn to_json(
    event: &ProtocolEvent,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    state.inject_into(&mut value);
    Ok(value)
}
