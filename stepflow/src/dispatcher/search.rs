//! Empty-result detection for search commands.
//!
//! A search tool that exits cleanly without printing anything "succeeded" at finding
//! nothing. Such results are turned into failures tagged [`NO_RESULTS_TAG`] so recovery can
//! widen the search instead of the plan carrying on with no data.

use crate::state::{Skill, StepResult};

/// Prefix of the error text of a reclassified empty search.
pub const NO_RESULTS_TAG: &str = "[no_results]";

/// Commands treated as search tools.
pub const SEARCH_COMMANDS: &[&str] = &[
    "find", "locate", "plocate", "mdfind", "fd", "fdfind", "rg", "grep", "egrep", "ag", "ack",
];

/// Program name of a shell command: first word after `sudo`/`env`/`VAR=value` prefixes,
/// without its directory.
pub fn program_name(command: &str) -> Option<&str> {
    command
        .split_whitespace()
        .find(|word| !matches!(*word, "sudo" | "env" | "command") && !word.contains('='))
        .map(|word| word.rsplit('/').next().unwrap_or(word))
}

/// True when `command` runs a built-in or configured search tool.
pub fn is_search_command(command: &str, extra: &[String]) -> bool {
    match program_name(command) {
        Some(name) => SEARCH_COMMANDS.contains(&name) || extra.iter().any(|e| e == name),
        None => false,
    }
}

/// Reclassifies an empty search as a failure. Returns true when `result` was changed.
///
/// Clean exits with empty stdout qualify, as does the grep-style exit code 1 with nothing on
/// stdout or stderr (the conventional "no match" status).
pub fn reclassify_empty_search(result: &mut StepResult, extra: &[String]) -> bool {
    if result.skill != Skill::ShellRun || !result.stdout.trim().is_empty() {
        return false;
    }
    let Some(command) = result
        .args
        .get("command")
        .and_then(|v| v.as_str())
        .map(str::to_string)
    else {
        return false;
    };
    if !is_search_command(&command, extra) {
        return false;
    }
    let clean_exit = result.ok && matches!(result.exit_code, Some(0) | None);
    let no_match_exit = !result.ok && result.exit_code == Some(1) && result.stderr.trim().is_empty();
    if !(clean_exit || no_match_exit) {
        return false;
    }
    result.ok = false;
    result.error = Some(format!(
        "{} `{}` finished without output",
        NO_RESULTS_TAG,
        crate::trace::truncate_for_display(&command, 120)
    ));
    true
}
