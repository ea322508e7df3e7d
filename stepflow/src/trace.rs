//! Execution trace: append-only per-stage timing, snapshot and success flag.
//!
//! The engine appends one [`TraceEntry`] per stage invocation (including each stage of a
//! parallel batch). Snapshots are size bounded so long runs keep small traces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest string kept verbatim inside a snapshot.
const MAX_SNAPSHOT_STRING: usize = 240;
/// Longest array kept verbatim inside a snapshot.
const MAX_SNAPSHOT_ITEMS: usize = 8;

/// One stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Bounded snapshot of the state fields the stage reads (not the whole state).
    pub snapshot: Value,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when the stage ran as part of a parallel batch.
    #[serde(default)]
    pub parallel: bool,
}

/// Append-only list of trace entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionTrace {
    entries: Vec<TraceEntry>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries recorded for `stage`.
    pub fn count_for(&self, stage: &str) -> usize {
        self.entries.iter().filter(|e| e.stage == stage).count()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.entries.iter().map(|e| e.duration_ms).sum()
    }
}

/// Returns a copy of `value` with long strings and arrays shortened, and the whole value
/// replaced by a truncated string when its serialized form still exceeds `max_chars`.
pub fn bounded_snapshot(value: &Value, max_chars: usize) -> Value {
    let shrunk = shrink(value);
    let rendered = shrunk.to_string();
    if rendered.chars().count() <= max_chars {
        shrunk
    } else {
        Value::String(truncate_for_display(&rendered, max_chars))
    }
}

fn shrink(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_for_display(s, MAX_SNAPSHOT_STRING)),
        Value::Array(items) => {
            let mut out: Vec<Value> = items.iter().take(MAX_SNAPSHOT_ITEMS).map(shrink).collect();
            if items.len() > MAX_SNAPSHOT_ITEMS {
                out.push(Value::String(format!(
                    "... {} more",
                    items.len() - MAX_SNAPSHOT_ITEMS
                )));
            }
            Value::Array(out)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), shrink(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Truncates `text` to at most `max` characters (char-boundary safe), appending `…` when cut.
pub fn truncate_for_display(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
