//! Deterministic recovery rules, matched on the failure text before any LLM call.
//!
//! Rules are checked in order and the first match wins. Each rule has a tag; the state keeps
//! how often each tag fired for this request, so a rule can try a fix once and ask the user
//! the second time.

use serde_json::{json, Map, Value};

use crate::dispatcher::{step_timeout_ms, BASE_TIMEOUT_ARG, NO_RESULTS_TAG};
use crate::state::{
    BrowserSessionContext, RecoveryDecision, Skill, SkillStep, StateChange, StepResult,
    WorkflowState,
};
use crate::trace::truncate_for_display;

/// Timeout retries allowed per step before asking the user.
pub const MAX_TIMEOUT_RETRIES: u32 = 2;

pub const TAG_UNIMPLEMENTED: &str = "unimplemented";
pub const TAG_INPUT_NOT_FOUND: &str = "input_not_found";
pub const TAG_SELECTOR_TIMEOUT: &str = "selector_timeout";
pub const TAG_NAVIGATION: &str = "navigation";
pub const TAG_SESSION_CLOSED: &str = "session_closed";
pub const TAG_PERMISSION_DENIED: &str = "permission_denied";
pub const TAG_COMMAND_NOT_FOUND: &str = "command_not_found";
pub const TAG_NO_RESULTS: &str = "no_results";
pub const TAG_TIMEOUT: &str = "timeout";

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub failed: &'a StepResult,
    /// Plan step that failed (args as planned, before substitution).
    pub step: Option<&'a SkillStep>,
    pub state: &'a WorkflowState,
    pub default_timeout_ms: u64,
}

impl<'a> FailureContext<'a> {
    fn text(&self) -> String {
        self.failed.failure_text()
    }

    fn is_browser(&self) -> bool {
        self.failed.skill == Skill::BrowserAct
    }

    fn is_shell(&self) -> bool {
        self.failed.skill == Skill::ShellRun
    }

    fn command(&self) -> &str {
        self.failed
            .args
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// A matched rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FastPathMatch {
    pub tag: &'static str,
    pub decision: RecoveryDecision,
    /// Extra state changes applied after the decision (scope level, retry count, ...).
    pub extra: Vec<StateChange>,
}

impl FastPathMatch {
    fn new(tag: &'static str, decision: RecoveryDecision) -> Self {
        Self {
            tag,
            decision,
            extra: Vec::new(),
        }
    }

    fn with(mut self, change: StateChange) -> Self {
        self.extra.push(change);
        self
    }
}

type Rule = fn(&FailureContext<'_>) -> Option<FastPathMatch>;

/// `no_results` goes first: its error text quotes the search command, whose terms may contain
/// phrases the other rules look for.
const RULES: &[Rule] = &[
    no_results,
    unimplemented,
    input_not_found,
    selector_timeout,
    navigation_failed,
    session_closed,
    permission_denied,
    command_not_found,
    timeout,
];

/// First matching rule, if any.
pub fn match_failure(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    RULES.iter().find_map(|rule| rule(ctx))
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn unimplemented(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    let text = ctx.text();
    if !contains_any(
        &text,
        &["not implemented", "unimplemented", "unsupported skill", "unknown skill"],
    ) {
        return None;
    }
    Some(FastPathMatch::new(
        TAG_UNIMPLEMENTED,
        RecoveryDecision::ask_user(
            format!(
                "The automation service cannot run `{}` steps yet. How should I continue?",
                ctx.failed.skill
            ),
            &["Try a different approach", "Cancel the task"],
        ),
    ))
}

/// Page text suggests a login or sign-up wall.
fn looks_like_login(ctx: &FailureContext<'_>) -> bool {
    let mut haystack = ctx.text();
    haystack.push_str(&ctx.failed.stdout.to_lowercase());
    if let Some(result) = &ctx.failed.result {
        haystack.push_str(&result.to_string().to_lowercase());
    }
    if let Some(url) = ctx.failed.url.as_deref().or(ctx.state.browser.active_url.as_deref()) {
        haystack.push_str(&url.to_lowercase());
    }
    contains_any(
        &haystack,
        &["log in", "login", "sign in", "signin", "sign up", "signup", "password", "/accounts"],
    )
}

fn auto_type_replan(ctx: &FailureContext<'_>, tag: &'static str, what: &str) -> FastPathMatch {
    if ctx.state.occurrences(tag) == 0 {
        FastPathMatch::new(
            tag,
            RecoveryDecision::Replan {
                suggestion: format!(
                    "{}. Use browser_act with action \"auto_type\" and no selector so the input field is discovered automatically.",
                    what
                ),
                alternative_cwd: None,
                constraint: Some("do not pass a CSS selector for text input".to_string()),
            },
        )
    } else {
        FastPathMatch::new(
            tag,
            RecoveryDecision::ask_user(
                format!(
                    "{} again, even with automatic input discovery. Can you point me to the right field or page?",
                    what
                ),
                &["Describe where the field is", "Try a different approach", "Cancel the task"],
            ),
        )
    }
}

fn input_not_found(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    if !ctx.is_browser() {
        return None;
    }
    let text = ctx.text();
    if !contains_any(
        &text,
        &[
            "no input",
            "input not found",
            "could not find input",
            "no editable element",
            "element not found",
            "no such element",
        ],
    ) {
        return None;
    }
    if looks_like_login(ctx) {
        return Some(FastPathMatch::new(
            TAG_INPUT_NOT_FOUND,
            RecoveryDecision::ask_user(
                "The page is asking you to sign in. Please log in in the browser window, then tell me to continue.",
                &["I've logged in, continue", "Cancel the task"],
            ),
        ));
    }
    Some(auto_type_replan(
        ctx,
        TAG_INPUT_NOT_FOUND,
        "The input field could not be found on the page",
    ))
}

fn selector_timeout(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    if !ctx.is_browser() {
        return None;
    }
    let text = ctx.text();
    let hit = text.contains("waiting for selector")
        || (text.contains("selector") && contains_any(&text, &["timeout", "timed out"]));
    if !hit {
        return None;
    }
    Some(auto_type_replan(
        ctx,
        TAG_SELECTOR_TIMEOUT,
        "The page element did not appear in time",
    ))
}

fn navigation_failed(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    if !ctx.is_browser() {
        return None;
    }
    let text = ctx.text();
    if !contains_any(
        &text,
        &[
            "net::err",
            "navigation failed",
            "failed to navigate",
            "name_not_resolved",
            "dns",
            "connection refused",
            "ssl",
        ],
    ) {
        return None;
    }
    let target = ctx
        .failed
        .args
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or("the page");
    Some(FastPathMatch::new(
        TAG_NAVIGATION,
        RecoveryDecision::ask_user(
            format!(
                "I couldn't load {}. Please check the address or your connection. How should I continue?",
                target
            ),
            &["Retry the step", "Try a different site", "Cancel the task"],
        ),
    ))
}

fn session_closed(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    if !ctx.is_browser() {
        return None;
    }
    let text = ctx.text();
    if !contains_any(
        &text,
        &[
            "target closed",
            "session closed",
            "browser has been closed",
            "page has been closed",
            "no such session",
            "session not found",
        ],
    ) {
        return None;
    }
    if ctx.state.occurrences(TAG_SESSION_CLOSED) > 0 {
        return Some(FastPathMatch::new(
            TAG_SESSION_CLOSED,
            RecoveryDecision::ask_user(
                "The browser session keeps closing unexpectedly. How should I continue?",
                &["Retry the step", "Try a different approach", "Cancel the task"],
            ),
        ));
    }
    let fresh = format!("s{}", ctx.state.replan_count + 2);
    Some(
        FastPathMatch::new(
            TAG_SESSION_CLOSED,
            RecoveryDecision::Replan {
                suggestion: format!(
                    "The browser session was closed. Start a fresh browser session with session_id \"{}\" and reopen the page first.",
                    fresh
                ),
                alternative_cwd: None,
                constraint: Some(format!("use session_id \"{}\" for every browser step", fresh)),
            },
        )
        .with(StateChange::SetBrowser(BrowserSessionContext::default())),
    )
}

fn permission_denied(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    let text = ctx.text();
    if !contains_any(
        &text,
        &["permission denied", "operation not permitted", "read-only file system", "eacces"],
    ) {
        return None;
    }
    let fallback = dirs::home_dir()
        .map(|h| h.join("stepflow-output").display().to_string())
        .unwrap_or_else(|| "~/stepflow-output".to_string());
    let temp = std::env::temp_dir().join("stepflow").display().to_string();
    let creating = ctx.command().contains("mkdir") || text.contains("cannot create directory");
    let question = if creating {
        "I don't have permission to create that directory. Where should I create it instead?"
    } else {
        "I don't have permission to write there. Which location should I use instead?"
    };
    let options = [
        format!("Use {}", fallback),
        format!("Use {}", temp),
        "Cancel the task".to_string(),
    ];
    Some(FastPathMatch::new(
        TAG_PERMISSION_DENIED,
        RecoveryDecision::AskUser {
            question: question.to_string(),
            options: options.to_vec(),
        },
    ))
}

fn command_not_found(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    if !ctx.is_shell() {
        return None;
    }
    let text = ctx.text();
    let hit = text.contains("command not found")
        || text.contains("is not recognized as an internal or external command")
        || (ctx.failed.exit_code == Some(127) && text.contains("not found"));
    if !hit {
        return None;
    }
    let program = crate::dispatcher::program_name(ctx.command()).unwrap_or("the required tool");
    Some(FastPathMatch::new(
        TAG_COMMAND_NOT_FOUND,
        RecoveryDecision::AskUser {
            question: format!(
                "`{}` is not installed on this machine. Should I install it?",
                program
            ),
            options: vec![
                format!("Install {} and retry", program),
                "Try a different approach".to_string(),
                "Cancel the task".to_string(),
            ],
        },
    ))
}

/// Successive broadening strategies for empty searches.
fn broadened_search(level: u32) -> Option<String> {
    match level {
        0 => Some(
            "The search found nothing. Widen it: search the parent directory as well and match names case-insensitively and partially (e.g. `-iname '*term*'`)."
                .to_string(),
        ),
        1 => Some(
            "The wider search found nothing. Use a full search tool across the filesystem (`locate -i`, `mdfind`, or `find / -iname '*term*' 2>/dev/null`)."
                .to_string(),
        ),
        2 => {
            let home = dirs::home_dir()
                .map(|h| h.display().to_string())
                .unwrap_or_else(|| "~".to_string());
            Some(format!(
                "Still nothing. Search the whole home directory {} recursively, case-insensitively, including hidden directories.",
                home
            ))
        }
        _ => None,
    }
}

fn no_results(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    let error = ctx.failed.error.as_deref().unwrap_or("");
    if !error.starts_with(NO_RESULTS_TAG) {
        return None;
    }
    let level = ctx.state.search_scope_level;
    let decision = match broadened_search(level) {
        Some(suggestion) => RecoveryDecision::Replan {
            suggestion,
            alternative_cwd: None,
            constraint: None,
        },
        None => RecoveryDecision::ask_user(
            "I searched progressively wider, up to your whole home directory, and found nothing. Can you tell me more about where it might be?",
            &["Search somewhere else", "Try different search terms", "Cancel the task"],
        ),
    };
    Some(FastPathMatch::new(TAG_NO_RESULTS, decision).with(StateChange::SetSearchScope(level + 1)))
}

fn timeout(ctx: &FailureContext<'_>) -> Option<FastPathMatch> {
    let text = ctx.text();
    if !contains_any(&text, &["timeout", "timed out", "etimedout", "deadline exceeded"]) {
        return None;
    }
    let retries = ctx.state.step_retry_count;
    let args = ctx.step.map(|s| &s.args).unwrap_or(&ctx.failed.args);
    let current = step_timeout_ms(args, ctx.default_timeout_ms);
    let original = args
        .get(BASE_TIMEOUT_ARG)
        .and_then(Value::as_u64)
        .filter(|v| *v > 0)
        .unwrap_or(current / u64::from(retries + 1));
    if retries >= MAX_TIMEOUT_RETRIES {
        return Some(FastPathMatch::new(
            TAG_TIMEOUT,
            RecoveryDecision::ask_user(
                format!(
                    "This step keeps timing out, even with {} s. How should I continue?",
                    current / 1000
                ),
                &["Retry with a longer timeout", "Try a different approach", "Cancel the task"],
            ),
        ));
    }
    let patched = original * u64::from(retries + 2);
    let mut patched_args = Map::new();
    patched_args.insert("timeout_ms".to_string(), json!(patched));
    patched_args.insert(BASE_TIMEOUT_ARG.to_string(), json!(original));
    Some(
        FastPathMatch::new(
            TAG_TIMEOUT,
            RecoveryDecision::AutoPatch {
                patched_args,
                note: format!(
                    "timed out; retrying with {} ms ({}x)",
                    patched,
                    retries + 2
                ),
            },
        )
        .with(StateChange::SetRetryCount(retries + 1)),
    )
}

/// Short description of the failure for questions built outside the rules.
pub fn describe_failure(failed: &StepResult) -> String {
    let error = failed.error.as_deref().unwrap_or("unknown error");
    format!(
        "Step {} ({}) failed: {}",
        failed.step_index + 1,
        if failed.description.is_empty() {
            failed.skill.as_str()
        } else {
            failed.description.as_str()
        },
        truncate_for_display(error, 200)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(skill: Skill, args: Value, error: &str) -> StepResult {
        let args = args.as_object().cloned().unwrap_or_default();
        let step = SkillStep::new(skill, args, "step");
        StepResult::failure(0, &step, error)
    }

    fn ctx<'a>(failed: &'a StepResult, state: &'a WorkflowState) -> FailureContext<'a> {
        FailureContext {
            failed,
            step: None,
            state,
            default_timeout_ms: 10_000,
        }
    }

    #[test]
    fn unimplemented_skill_asks_user() {
        let state = WorkflowState::default();
        let f = failed(Skill::UiWaitFor, json!({}), "ui_wait_for is not implemented");
        let m = match_failure(&ctx(&f, &state)).unwrap();
        assert_eq!(m.tag, TAG_UNIMPLEMENTED);
        assert_eq!(m.decision.kind(), "ask_user");
    }

    #[test]
    fn missing_input_replans_then_asks() {
        let mut state = WorkflowState::default();
        let f = failed(Skill::BrowserAct, json!({"action": "type"}), "Input not found for selector #q");
        let first = match_failure(&ctx(&f, &state)).unwrap();
        assert_eq!(first.tag, TAG_INPUT_NOT_FOUND);
        assert!(matches!(first.decision, RecoveryDecision::Replan { ref suggestion, .. } if suggestion.contains("auto_type")));

        state.recovery_occurrences.insert(TAG_INPUT_NOT_FOUND.into(), 1);
        let second = match_failure(&ctx(&f, &state)).unwrap();
        assert_eq!(second.decision.kind(), "ask_user");
    }

    #[test]
    fn missing_input_on_login_page_asks_to_authenticate() {
        let state = WorkflowState::default();
        let mut f = failed(Skill::BrowserAct, json!({}), "no input element found");
        f.url = Some("https://example.com/login".into());
        let m = match_failure(&ctx(&f, &state)).unwrap();
        assert!(matches!(m.decision, RecoveryDecision::AskUser { ref question, .. } if question.contains("sign in")));
    }

    #[test]
    fn selector_timeout_wins_over_generic_timeout() {
        let state = WorkflowState::default();
        let f = failed(Skill::BrowserAct, json!({}), "Timeout 30000ms exceeded waiting for selector \"#send\"");
        assert_eq!(match_failure(&ctx(&f, &state)).unwrap().tag, TAG_SELECTOR_TIMEOUT);
    }

    #[test]
    fn navigation_failure_asks_user() {
        let state = WorkflowState::default();
        let f = failed(Skill::BrowserAct, json!({"url": "https://nope.invalid"}), "net::ERR_NAME_NOT_RESOLVED");
        let m = match_failure(&ctx(&f, &state)).unwrap();
        assert_eq!(m.tag, TAG_NAVIGATION);
        assert!(m.decision.detail().contains("nope.invalid"));
    }

    #[test]
    fn closed_session_replans_with_fresh_session_and_clears_browser() {
        let state = WorkflowState::default();
        let f = failed(Skill::BrowserAct, json!({"session_id": "s1"}), "Target closed");
        let m = match_failure(&ctx(&f, &state)).unwrap();
        assert_eq!(m.decision.kind(), "replan");
        assert!(m.extra.contains(&StateChange::SetBrowser(BrowserSessionContext::default())));
    }

    #[test]
    fn permission_denied_offers_alternative_locations() {
        let state = WorkflowState::default();
        let f = failed(Skill::ShellRun, json!({"command": "mkdir /opt/reports"}), "mkdir: cannot create directory '/opt/reports': Permission denied");
        let m = match_failure(&ctx(&f, &state)).unwrap();
        assert_eq!(m.tag, TAG_PERMISSION_DENIED);
        match m.decision {
            RecoveryDecision::AskUser { question, options } => {
                assert!(question.contains("create that directory"));
                assert!(options[0].contains("stepflow-output"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn command_not_found_offers_install() {
        let state = WorkflowState::default();
        let mut f = failed(Skill::ShellRun, json!({"command": "jq .a data.json"}), "sh: jq: command not found");
        f.exit_code = Some(127);
        let m = match_failure(&ctx(&f, &state)).unwrap();
        assert!(m.decision.detail().contains("`jq`"));
    }

    #[test]
    fn no_results_broadens_then_asks() {
        let mut state = WorkflowState::default();
        let f = failed(Skill::ShellRun, json!({"command": "find . -name x"}), "[no_results] `find . -name x` finished without output");
        for level in 0..3 {
            state.search_scope_level = level;
            let m = match_failure(&ctx(&f, &state)).unwrap();
            assert_eq!(m.decision.kind(), "replan", "level {}", level);
            assert!(m.extra.contains(&StateChange::SetSearchScope(level + 1)));
        }
        state.search_scope_level = 3;
        assert_eq!(match_failure(&ctx(&f, &state)).unwrap().decision.kind(), "ask_user");
    }

    #[test]
    fn empty_search_for_error_phrases_still_widens() {
        let state = WorkflowState::default();
        for command in [
            "grep -ri 'permission denied' /var/log/app",
            "grep -rn 'not implemented' src",
            "grep -r 'command not found' ~/.bash_history",
            "rg 'timed out' logs",
        ] {
            let step = SkillStep::new(
                Skill::ShellRun,
                json!({"command": command}).as_object().cloned().unwrap(),
                "search",
            );
            let mut f = StepResult::failure(0, &step, "");
            f.ok = true;
            f.error = None;
            f.exit_code = Some(0);
            assert!(crate::dispatcher::reclassify_empty_search(&mut f, &[]));
            let m = match_failure(&ctx(&f, &state)).unwrap();
            assert_eq!(m.tag, TAG_NO_RESULTS, "{}", command);
            assert_eq!(m.decision.kind(), "replan", "{}", command);
        }
    }

    #[test]
    fn timeout_escalates_two_then_three_times_original() {
        let mut state = WorkflowState::default();
        let step = SkillStep::new(Skill::ShellRun, json!({"timeout_ms": 4000}).as_object().cloned().unwrap(), "slow");
        let f = StepResult::failure(0, &step, "timeout: no response after 4000 ms");
        let mut c = ctx(&f, &state);
        c.step = Some(&step);
        let first = match_failure(&c).unwrap();
        match &first.decision {
            RecoveryDecision::AutoPatch { patched_args, .. } => assert_eq!(patched_args["timeout_ms"], json!(8000)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(first.extra.contains(&StateChange::SetRetryCount(1)));

        let patched = step.patched(&json!({"timeout_ms": 8000}).as_object().cloned().unwrap());
        state.step_retry_count = 1;
        let mut c = ctx(&f, &state);
        c.step = Some(&patched);
        match match_failure(&c).unwrap().decision {
            RecoveryDecision::AutoPatch { patched_args, .. } => assert_eq!(patched_args["timeout_ms"], json!(12000)),
            other => panic!("unexpected {:?}", other),
        }

        state.step_retry_count = 2;
        let mut c = ctx(&f, &state);
        c.step = Some(&patched);
        assert_eq!(match_failure(&c).unwrap().decision.kind(), "ask_user");
    }

    #[test]
    fn timeout_after_other_patch_scales_from_planned_timeout() {
        let state = WorkflowState::default();
        let step = SkillStep::new(
            Skill::ShellRun,
            json!({"timeout_ms": 8000, "base_timeout_ms": 4000}).as_object().cloned().unwrap(),
            "slow",
        );
        let f = StepResult::failure(0, &step, "command timed out");
        let mut c = ctx(&f, &state);
        c.step = Some(&step);
        match match_failure(&c).unwrap().decision {
            RecoveryDecision::AutoPatch { patched_args, .. } => {
                assert_eq!(patched_args["timeout_ms"], json!(8000));
                assert_eq!(patched_args["base_timeout_ms"], json!(4000));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_failure_has_no_rule() {
        let state = WorkflowState::default();
        let f = failed(Skill::ShellRun, json!({"command": "make"}), "make: *** [all] Error 2");
        assert!(match_failure(&ctx(&f, &state)).is_none());
    }
}
