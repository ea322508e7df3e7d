//! Browser session reuse across plans.
//!
//! When a task already has an open browser session and the new plan works in a single
//! session, every browser step is moved onto the open session, and a leading navigation to
//! the page that is already open is dropped (unless it is the whole plan). Plans that use
//! several session ids compare independent sites and are left alone.

use std::collections::BTreeSet;

use serde_json::Value;
use url::Url;

use crate::state::{BrowserSessionContext, SkillPlan};

/// Hostname pairs that serve the same product.
const DOMAIN_ALIASES: &[(&str, &str)] = &[
    ("x.com", "twitter.com"),
    ("youtu.be", "youtube.com"),
    ("m.youtube.com", "youtube.com"),
    ("mail.google.com", "gmail.com"),
];

const NAVIGATE_ACTIONS: &[&str] = &["navigate", "open", "goto", "open_url"];

/// Applies session reuse to `plan`; returns true when anything changed.
pub fn normalize_sessions(plan: &mut SkillPlan, browser: &BrowserSessionContext) -> bool {
    let Some(active) = browser.active_session_id.as_deref() else {
        return false;
    };
    let ids: BTreeSet<&str> = plan.iter().filter_map(|s| s.session_id()).collect();
    if ids.len() != 1 {
        if ids.len() > 1 {
            tracing::debug!(sessions = ids.len(), "multi-session plan, leaving sessions untouched");
        }
        return false;
    }

    let mut changed = false;
    for step in plan.iter_mut().filter(|s| s.skill.is_browser()) {
        if step.session_id() != Some(active) {
            step.args
                .insert("session_id".to_string(), Value::String(active.to_string()));
            changed = true;
        }
    }

    let active_domain = browser.active_url.as_deref().and_then(canonical_domain);
    let first_nav = plan.iter().position(is_navigation).filter(|_| plan.len() > 1);
    if let (Some(active_domain), Some(index)) = (active_domain, first_nav) {
        let target = plan[index].arg_str("url").and_then(canonical_domain);
        if target.as_deref() == Some(active_domain.as_str()) {
            tracing::debug!(index, domain = %active_domain, "dropping redundant navigation");
            plan.remove(index);
            changed = true;
        }
    }
    changed
}

fn is_navigation(step: &crate::state::SkillStep) -> bool {
    if !step.skill.is_browser() || step.arg_str("url").is_none() {
        return false;
    }
    match step.arg_str("action") {
        None => true,
        Some(action) => NAVIGATE_ACTIONS.contains(&action.trim().to_lowercase().as_str()),
    }
}

/// Lowercased host without `www.`, with aliases mapped to one name. Accepts bare hosts.
pub fn canonical_domain(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let parsed = Url::parse(raw).or_else(|_| Url::parse(&format!("https://{}", raw)));
    let host = parsed.ok()?.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    Some(
        DOMAIN_ALIASES
            .iter()
            .find(|(alias, _)| *alias == host)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or(host),
    )
}
