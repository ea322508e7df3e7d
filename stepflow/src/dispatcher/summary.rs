//! Final summary composed when the cursor reaches the end of the plan.

use crate::state::{Skill, StepResult, WorkflowState};
use crate::trace::truncate_for_display;

/// Human-readable summary of a finished plan.
///
/// Counts succeeded and failed attempts, then reports the latest synthesis answer if any,
/// else the last successful output; browser tasks also get the final page.
pub fn compose_summary(state: &WorkflowState) -> String {
    let ok = state.skill_results.iter().filter(|r| r.ok).count();
    let failed = state.skill_results.len() - ok;
    let mut lines = vec![format!(
        "Completed {} step{} ({} succeeded, {} failed attempt{}).",
        state.plan.len(),
        if state.plan.len() == 1 { "" } else { "s" },
        ok,
        failed,
        if failed == 1 { "" } else { "s" },
    )];

    let results = &state.skill_results;
    if let Some(browser) = last_ok(results, |r| r.skill == Skill::BrowserAct) {
        let url = browser
            .url
            .clone()
            .or_else(|| state.browser.active_url.clone());
        match (browser.page_title(), url) {
            (Some(title), Some(url)) => lines.push(format!("Final page: {} ({})", title, url)),
            (Some(title), None) => lines.push(format!("Final page: {}", title)),
            (None, Some(url)) => lines.push(format!("Final page: {}", url)),
            (None, None) => {}
        }
    }

    if let Some(synthesis) = last_ok(results, |r| r.skill == Skill::Synthesize) {
        lines.push(String::new());
        lines.push(synthesis.stdout.trim().to_string());
    } else if let Some(last) = last_ok(results, |r| !r.output_text().is_empty()) {
        lines.push(format!(
            "Last output:\n{}",
            truncate_for_display(&last.output_text(), 1000)
        ));
    }
    lines.join("\n")
}

fn last_ok(results: &[StepResult], pred: impl Fn(&StepResult) -> bool) -> Option<&StepResult> {
    results.iter().rev().find(|r| r.ok && pred(r))
}
