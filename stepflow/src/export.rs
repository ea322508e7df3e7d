//! Bridge from [`ProgressEvent`] to the `stream-event` wire shape.
//!
//! Callers convert each event with [`to_protocol_event`] and then use
//! [`stream_event::to_json`] with an [`EnvelopeState`] to produce one NDJSON line, or call
//! [`to_protocol_value`] to do both at once.

pub use stream_event::{to_json as stream_event_to_json, Envelope, EnvelopeState, ProtocolEvent};

use serde_json::Value;

use crate::dispatcher::DISPATCHER_STAGE;
use crate::progress::ProgressEvent;

/// Converts a progress event into its protocol form.
pub fn to_protocol_event(ev: &ProgressEvent) -> Result<ProtocolEvent, serde_json::Error> {
    let pe = match ev {
        ProgressEvent::StageEnter { stage } => ProtocolEvent::StageEnter { id: stage.clone() },
        ProgressEvent::StageExit {
            stage,
            ok,
            duration_ms,
        } => ProtocolEvent::StageExit {
            id: stage.clone(),
            ok: *ok,
            duration_ms: *duration_ms,
        },
        ProgressEvent::PlanStart { request, replan } => ProtocolEvent::PlanStart {
            request: request.clone(),
            replan: *replan,
        },
        ProgressEvent::PlanReady { steps } => ProtocolEvent::PlanReady {
            step_count: steps.len(),
            steps: serde_json::to_value(steps)?,
        },
        ProgressEvent::PlanError { message } => ProtocolEvent::PlanError {
            message: message.clone(),
        },
        ProgressEvent::StepStart {
            index,
            skill,
            description,
        } => ProtocolEvent::StepStart {
            index: *index,
            skill: skill.clone(),
            description: description.clone(),
        },
        ProgressEvent::StepSuccess {
            index,
            skill,
            output,
            ..
        } => ProtocolEvent::StepSuccess {
            index: *index,
            skill: skill.clone(),
            output: output.clone(),
        },
        ProgressEvent::StepFailure {
            index,
            skill,
            error,
            optional,
            ..
        } => ProtocolEvent::StepFailure {
            index: *index,
            skill: skill.clone(),
            error: error.clone(),
            optional: *optional,
        },
        ProgressEvent::SynthesisToken { content } => ProtocolEvent::MessageChunk {
            content: content.clone(),
            id: DISPATCHER_STAGE.to_string(),
        },
        ProgressEvent::Recovery {
            index,
            decision,
            detail,
            fast_path,
        } => ProtocolEvent::Recovery {
            index: *index,
            decision: decision.clone(),
            detail: detail.clone(),
            fast_path: *fast_path,
        },
        ProgressEvent::Complete { outcome, summary } => ProtocolEvent::Complete {
            outcome: outcome.clone(),
            summary: summary.clone(),
        },
    };
    Ok(pe)
}

/// Converts a progress event to protocol JSON with the envelope injected.
pub fn to_protocol_value(
    ev: &ProgressEvent,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let pe = to_protocol_event(ev)?;
    stream_event::to_json(&pe, state)
}
