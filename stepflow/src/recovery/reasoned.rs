//! LLM-reasoned recovery for failures no fast-path rule recognizes.
//!
//! The LLM sees the request, the failed step and the rest of the plan, and answers with one
//! JSON decision object. Anything that is not a well-formed decision yields `None`; the
//! caller then asks the user.

use serde_json::Value;

use crate::json_extract::extract_first_value;
use crate::state::{RecoveryDecision, StepResult, WorkflowState};
use crate::trace::truncate_for_display;

/// System prompt for recovery reasoning.
pub const RECOVERY_SYSTEM: &str = r#"You are the recovery planner of an automation agent. A step of the current plan failed. Decide how to continue.

Choose exactly one action:
- auto_patch: the same step will work with different arguments. Output {"action": "auto_patch", "patched_args": {...only the args to change...}, "note": "short reason"}
- replan: the approach is wrong and the remaining work must be planned again. Output {"action": "replan", "suggestion": "what to do differently", "alternative_cwd": "optional directory", "constraint": "optional rule for the new plan"}
- ask_user: only the user can resolve this (credentials, missing information, a choice). Output {"action": "ask_user", "question": "clear question", "options": ["option 1", "option 2"]}

Rules:
- Output ONLY the JSON object, no markdown or explanation.
- Never repeat a step that already succeeded.
- Prefer auto_patch for typos, wrong flags or wrong paths; replan when a different tool or order is needed.
"#;

/// Builds the user prompt describing the failure.
pub fn build_recovery_prompt(state: &WorkflowState, failed: &StepResult) -> String {
    let completed: Vec<String> = state
        .skill_results
        .iter()
        .filter(|r| r.ok)
        .map(|r| format!("- [{}] {} ({})", r.step_index + 1, r.description, r.skill))
        .collect();
    let remaining: Vec<String> = state
        .plan
        .iter()
        .enumerate()
        .skip(failed.step_index + 1)
        .map(|(i, s)| format!("- [{}] {} ({})", i + 1, s.description, s.skill))
        .collect();
    let none = || "- (none)".to_string();

    format!(
        "Original request: {request}\n\n\
         Failed step {index}: {description}\n\
         - skill: {skill}\n\
         - args: {args}\n\
         - error: {error}\n\
         - exit code: {exit}\n\
         - stderr: {stderr}\n\n\
         Completed steps:\n{completed}\n\n\
         Remaining steps:\n{remaining}",
        request = state.request,
        index = failed.step_index + 1,
        description = failed.description,
        skill = failed.skill,
        args = truncate_for_display(&Value::Object(failed.args.clone()).to_string(), 800),
        error = truncate_for_display(failed.error.as_deref().unwrap_or("(none)"), 600),
        exit = failed
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "(none)".to_string()),
        stderr = truncate_for_display(failed.stderr.trim(), 600),
        completed = if completed.is_empty() { none() } else { completed.join("\n") },
        remaining = if remaining.is_empty() { none() } else { remaining.join("\n") },
    )
}

/// Parses an LLM answer into a decision; `None` unless it is one of the three valid shapes.
pub fn parse_decision(raw: &str) -> Option<RecoveryDecision> {
    let Value::Object(mut obj) = extract_first_value(raw)? else {
        return None;
    };
    let action = ["action", "decision", "type"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(normalize_action)?;
    obj.insert("action".to_string(), Value::String(action.to_string()));
    if action == "auto_patch" && !obj.contains_key("patched_args") {
        if let Some(args) = obj.remove("args").or_else(|| obj.remove("patch")) {
            obj.insert("patched_args".to_string(), args);
        }
    }

    let decision: RecoveryDecision = serde_json::from_value(Value::Object(obj)).ok()?;
    let valid = match &decision {
        RecoveryDecision::AutoPatch { patched_args, .. } => !patched_args.is_empty(),
        RecoveryDecision::Replan { suggestion, .. } => !suggestion.trim().is_empty(),
        RecoveryDecision::AskUser { question, .. } => !question.trim().is_empty(),
    };
    valid.then_some(decision)
}

fn normalize_action(raw: &str) -> &'static str {
    match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
        "auto_patch" | "autopatch" | "patch" | "retry" => "auto_patch",
        "replan" | "re_plan" => "replan",
        "ask_user" | "askuser" | "ask" => "ask_user",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Skill, SkillStep};
    use serde_json::Map;

    #[test]
    fn parses_each_shape_and_aliases() {
        let d = parse_decision(r#"```json
{"action":"auto-patch","patched_args":{"command":"ls -la"},"note":"typo"}
```"#)
        .unwrap();
        assert_eq!(d.kind(), "auto_patch");
        let d = parse_decision(r#"{"decision":"replan","suggestion":"use curl"}"#).unwrap();
        assert_eq!(d.kind(), "replan");
        let d = parse_decision(r#"{"action":"ask","question":"Which folder?"}"#).unwrap();
        assert!(matches!(d, RecoveryDecision::AskUser { ref options, .. } if options.is_empty()));
        let d = parse_decision(r#"{"action":"patch","args":{"cwd":"/tmp"}}"#).unwrap();
        assert!(matches!(d, RecoveryDecision::AutoPatch { ref patched_args, .. } if patched_args["cwd"] == "/tmp"));
    }

    #[test]
    fn rejects_invalid_shapes() {
        assert!(parse_decision("I would retry it").is_none());
        assert!(parse_decision(r#"{"action":"dance"}"#).is_none());
        assert!(parse_decision(r#"{"action":"auto_patch","patched_args":{}}"#).is_none());
        assert!(parse_decision(r#"{"action":"replan","suggestion":"  "}"#).is_none());
        assert!(parse_decision(r#"[{"action":"replan","suggestion":"x"}]"#).is_none());
    }

    #[test]
    fn prompt_lists_completed_and_remaining_steps() {
        let mut state = WorkflowState::new("build the report", vec![]);
        state.plan = vec![
            SkillStep::new(Skill::ShellRun, Map::new(), "fetch data"),
            SkillStep::new(Skill::ShellRun, Map::new(), "render"),
            SkillStep::new(Skill::Synthesize, Map::new(), "summarize"),
        ];
        let mut ok = StepResult::failure(0, &state.plan[0], "");
        ok.ok = true;
        state.skill_results.push(ok);
        let mut failed = StepResult::failure(1, &state.plan[1], "exit status 2");
        failed.exit_code = Some(2);
        let prompt = build_recovery_prompt(&state, &failed);
        assert!(prompt.contains("Failed step 2: render"));
        assert!(prompt.contains("[1] fetch data"));
        assert!(prompt.contains("[3] summarize"));
        assert!(prompt.contains("exit code: 2"));
    }
}
