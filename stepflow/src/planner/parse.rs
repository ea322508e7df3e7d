//! Turns raw planner output into a validated plan.
//!
//! The text goes through `json_extract`; an array (or an object wrapping one) becomes
//! steps, an object without steps is a refusal. Each step is repaired where the intent is
//! clear (skill spelling, args given inline or as a string, string booleans, missing
//! descriptions) and dropped with a warning when the skill is unknown.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::json_extract::{extract_first_value, wrapped_array};
use crate::state::{Skill, SkillPlan, SkillStep};
use crate::trace::truncate_for_display;

/// Planner failure; surfaced to the user through [`PlanError::user_message`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("planner output could not be parsed")]
    Unparseable,
    #[error("planner refused: {reason}")]
    Refused { reason: String },
    #[error("planner produced no usable steps")]
    Empty,
    #[error("planner backend failed: {0}")]
    Backend(String),
}

impl PlanError {
    /// Plain-language message for the user; never contains raw LLM output.
    pub fn user_message(&self) -> String {
        match self {
            PlanError::Unparseable => "I couldn't turn that request into a runnable plan. \
                 Please rephrase it with a bit more detail."
                .to_string(),
            PlanError::Refused { reason } => {
                format!("I can't plan this task: {}", truncate_for_display(reason, 300))
            }
            PlanError::Empty => "I couldn't find any concrete steps for that request. \
                 Could you describe what you want done?"
                .to_string(),
            PlanError::Backend(_) => "No language model is available to plan this task right now. \
                 Check the LLM configuration and try again."
                .to_string(),
        }
    }
}

/// What one planner answer contained.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlan {
    Steps(SkillPlan),
    /// An explicit refusal; `templated` when the reason is empty or boilerplate.
    Refusal { reason: String, templated: bool },
    Unparseable,
}

/// Parses and repairs one planner answer.
pub fn parse_plan(raw: &str) -> ParsedPlan {
    match extract_first_value(raw) {
        Some(Value::Array(items)) => ParsedPlan::Steps(repair_steps(items)),
        Some(Value::Object(obj)) if obj.contains_key("skill") => {
            ParsedPlan::Steps(repair_steps(vec![Value::Object(obj)]))
        }
        Some(Value::Object(obj)) if is_refusal(&obj) => refusal(&obj),
        Some(Value::Object(obj)) => match wrapped_array(&obj) {
            Some(items) => ParsedPlan::Steps(repair_steps(items.clone())),
            None => refusal(&obj),
        },
        _ => ParsedPlan::Unparseable,
    }
}

/// An object that says it cannot plan, even when it also lists alternatives.
fn is_refusal(obj: &Map<String, Value>) -> bool {
    let says = |k: &str| obj.get(k).and_then(Value::as_str).is_some();
    says("error")
        || says("refusal")
        || (says("reason") && !obj.contains_key("steps") && !obj.contains_key("plan"))
}

fn refusal(obj: &Map<String, Value>) -> ParsedPlan {
    let reason = ["reason", "message", "error", "refusal"]
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !is_templated_reason(s))
        .unwrap_or("")
        .trim()
        .to_string();
    let templated = is_templated_reason(&reason);
    ParsedPlan::Refusal { reason, templated }
}

/// Empty, placeholder-like or error-code-like refusal reasons.
pub fn is_templated_reason(reason: &str) -> bool {
    let r = reason.trim().to_lowercase();
    r.is_empty()
        || r.contains("placeholder")
        || (r.starts_with('<') && r.ends_with('>'))
        || r.contains("{{")
        || r == "..."
        || r == "reason"
        || r == "cannot_plan"
        || r == "n/a"
}

fn repair_steps(items: Vec<Value>) -> SkillPlan {
    items.into_iter().filter_map(repair_step).collect()
}

fn repair_step(item: Value) -> Option<SkillStep> {
    let Value::Object(mut obj) = item else {
        tracing::warn!(item = %truncate_for_display(&item.to_string(), 120), "dropping non-object plan step");
        return None;
    };
    let name = ["skill", "action", "tool"]
        .iter()
        .find_map(|k| obj.remove(*k).and_then(|v| v.as_str().map(str::to_string)));
    let Some(name) = name else {
        tracing::warn!("dropping plan step without a skill");
        return None;
    };
    let Some(skill) = Skill::parse(&name) else {
        tracing::warn!(skill = %name, "dropping plan step with unknown skill");
        return None;
    };

    let optional = obj.remove("optional").map(as_bool).unwrap_or(false);
    let description = obj
        .remove("description")
        .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty());

    let explicit = ["args", "arguments", "params"]
        .iter()
        .find_map(|k| obj.remove(*k));
    let args = match explicit {
        Some(Value::Object(args)) => args,
        Some(Value::String(s)) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(args)) => args,
            _ => Map::new(),
        },
        _ => obj,
    };

    let description = description.unwrap_or_else(|| default_description(skill, &args));
    Some(SkillStep {
        skill,
        args,
        optional,
        description,
    })
}

fn as_bool(v: Value) -> bool {
    match v {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn default_description(skill: Skill, args: &Map<String, Value>) -> String {
    let get = |k: &str| args.get(k).and_then(Value::as_str);
    match skill {
        Skill::ShellRun => match get("command") {
            Some(cmd) => format!("Run `{}`", truncate_for_display(cmd, 60)),
            None => "Run a shell command".to_string(),
        },
        Skill::BrowserAct => match (get("action"), get("url")) {
            (Some(action), Some(url)) => format!("Browser {} {}", action, url),
            (Some(action), None) => format!("Browser {}", action),
            (None, Some(url)) => format!("Open {}", url),
            (None, None) => "Browser action".to_string(),
        },
        Skill::UiFindAndClick => format!("Click {}", get("target").unwrap_or("UI element")),
        Skill::UiTypeText => "Type text".to_string(),
        Skill::UiWaitFor => format!("Wait for {}", get("target").unwrap_or("UI element")),
        Skill::Synthesize => "Summarize the results".to_string(),
    }
}
