//! Planner prompts: skill catalogue, output contract and per-request context.

use crate::message::Message;
use crate::state::{BrowserSessionContext, RecoveryContext, StepResult};
use crate::trace::truncate_for_display;

/// Conversation turns included in the prompt.
pub const RECENT_TURNS: usize = 6;
/// Prior successful outputs included in the digest.
const MAX_DIGEST_RESULTS: usize = 8;
/// Characters kept per digested output.
const MAX_DIGEST_CHARS: usize = 300;

/// System prompt for plan generation.
///
/// The LLM must respond with a JSON array of steps
/// `[{"skill": "...", "args": {...}, "optional": false, "description": "..."}]`, or with
/// `{"error": "cannot_plan", "reason": "..."}` when the request cannot be automated.
pub const PLANNER_SYSTEM: &str = r#"You are an automation planner. Turn the user's request into an ordered list of concrete steps that an automation service will execute one at a time.

Available skills:
- shell_run: run a shell command. args: {"command": "...", "cwd": "optional dir", "timeout_ms": optional}
- browser_act: drive a browser page. args: {"action": "navigate|click|type|auto_type|extract|screenshot|close", "session_id": "s1", "url": "...", "selector": "...", "text": "...", "timeout_ms": optional}
- ui_find_and_click: click a desktop UI element. args: {"app": "...", "target": "visible label"}
- ui_type_text: type into the focused desktop element. args: {"text": "..."}
- ui_wait_for: wait until a desktop UI element appears. args: {"target": "...", "timeout_ms": optional}
- synthesize: write a natural-language answer from the outputs of earlier steps. args: {"instruction": "...", "save_to": "optional file path"}

Rules:
- Output ONLY a JSON array, no markdown or explanation.
- Each element: {"skill": "...", "args": {...}, "optional": false, "description": "short human-readable step"}.
- Mark a step "optional": true only when the task still makes sense if it fails.
- Browser steps that belong to one page share one "session_id". Use different session ids only when comparing several independent sites side by side.
- Later steps may use {{synthesisAnswer}}, {{synthesisPath}} or {{synthesisSavedPath}} in their args to refer to the latest synthesize step.
- Keep plans short: 1-8 steps.
- If the request cannot be automated with these skills, output {"error": "cannot_plan", "reason": "<a specific explanation>"}.
"#;

/// Appended when a previous answer refused without a usable reason.
pub const ENRICHED_RETRY_ADDON: &str = r#"
Your previous answer refused without a concrete reason. The skills above can run arbitrary shell commands and drive a real browser, so almost every request can be planned. Produce a concrete JSON array plan now. Only refuse if the request is truly impossible, and then state the exact reason."#;

/// Inputs the prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    pub request: &'a str,
    pub recovery: Option<&'a RecoveryContext>,
    pub prior_results: &'a [StepResult],
    pub conversation: &'a [Message],
    pub browser: &'a BrowserSessionContext,
}

/// Operating environment line: OS, home and temp directories.
pub fn environment_block() -> String {
    let home = dirs::home_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Environment:\n- OS: {} ({})\n- Home directory: {}\n- Temp directory: {}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        home,
        std::env::temp_dir().display()
    )
}

/// User prompt for one planning call.
pub fn build_plan_prompt(input: &PlanInput<'_>, enriched: bool) -> String {
    let mut sections = vec![
        format!("Request: {}", input.request.trim()),
        environment_block(),
    ];

    if let Some(recovery) = input.recovery {
        let mut block = String::from("A previous attempt failed. Plan again taking this into account:");
        if let Some(skill) = recovery.failed_skill {
            block.push_str(&format!("\n- Failed skill: {}", skill));
        }
        if !recovery.failure_reason.is_empty() {
            block.push_str(&format!(
                "\n- Failure: {}",
                truncate_for_display(&recovery.failure_reason, 400)
            ));
        }
        if !recovery.suggestion.is_empty() {
            block.push_str(&format!("\n- Suggested fix: {}", recovery.suggestion));
        }
        if let Some(cwd) = &recovery.alternative_cwd {
            block.push_str(&format!("\n- Work in this directory instead: {}", cwd));
        }
        if let Some(constraint) = &recovery.constraint {
            block.push_str(&format!("\n- Constraint: {}", constraint));
        }
        sections.push(block);
    }

    let digest: Vec<String> = input
        .prior_results
        .iter()
        .filter(|r| r.ok)
        .rev()
        .take(MAX_DIGEST_RESULTS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|r| {
            format!(
                "- [{}] {}: {}",
                r.skill,
                r.description,
                truncate_for_display(&r.output_text(), MAX_DIGEST_CHARS)
            )
        })
        .collect();
    if !digest.is_empty() {
        sections.push(format!(
            "Results of steps that already succeeded (do not repeat them unless needed):\n{}",
            digest.join("\n")
        ));
    }

    let start = input.conversation.len().saturating_sub(RECENT_TURNS);
    let turns: Vec<String> = input.conversation[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role(), truncate_for_display(m.content(), 500)))
        .collect();
    if !turns.is_empty() {
        sections.push(format!("Recent conversation:\n{}", turns.join("\n")));
    }

    if let Some(session) = &input.browser.active_session_id {
        let mut block = format!(
            "A browser session is already open for this task. Use session_id \"{}\" for every browser_act step.",
            session
        );
        if let Some(url) = &input.browser.active_url {
            block.push_str(&format!(
                " It is currently on {}; do not navigate there again.",
                url
            ));
        }
        sections.push(block);
    }

    let mut prompt = sections.join("\n\n");
    if enriched {
        prompt.push_str(ENRICHED_RETRY_ADDON);
    }
    prompt
}
