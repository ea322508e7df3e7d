//! Recovery-side state: browser session carry-over, planner guidance, pending questions
//! and the three recovery outcomes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Skill;

/// Browser session carried across steps and re-plans.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserSessionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_url: Option<String>,
}

impl BrowserSessionContext {
    pub fn is_active(&self) -> bool {
        self.active_session_id.is_some()
    }
}

/// Guidance handed to the planner after a Replan (or a user reply).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_skill: Option<Skill>,
    pub failure_reason: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

/// Question surfaced to the user; the run ends awaiting a reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Skill of the step that led to the question, for planner guidance on resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_skill: Option<Skill>,
    /// Failure text that led to the question.
    #[serde(default)]
    pub reason: String,
}

impl PendingQuestion {
    /// Question followed by numbered options, as shown to the user.
    pub fn render(&self) -> String {
        let mut text = self.question.clone();
        for (i, option) in self.options.iter().enumerate() {
            text.push_str(&format!("\n  {}. {}", i + 1, option));
        }
        text
    }
}

/// Exactly one of these is produced per failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryDecision {
    /// Merge `patched_args` into the failing step and retry it.
    AutoPatch {
        patched_args: Map<String, Value>,
        #[serde(default)]
        note: String,
    },
    /// Discard the plan and plan again with this guidance.
    Replan {
        suggestion: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alternative_cwd: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        constraint: Option<String>,
    },
    /// Stop and ask the user.
    AskUser {
        question: String,
        #[serde(default)]
        options: Vec<String>,
    },
}

impl RecoveryDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            RecoveryDecision::AutoPatch { .. } => "auto_patch",
            RecoveryDecision::Replan { .. } => "replan",
            RecoveryDecision::AskUser { .. } => "ask_user",
        }
    }

    /// One-line description for progress output.
    pub fn detail(&self) -> String {
        match self {
            RecoveryDecision::AutoPatch { patched_args, note } => {
                if note.is_empty() {
                    format!("patched {}", Value::Object(patched_args.clone()))
                } else {
                    note.clone()
                }
            }
            RecoveryDecision::Replan { suggestion, .. } => suggestion.clone(),
            RecoveryDecision::AskUser { question, .. } => question.clone(),
        }
    }

    pub fn ask_user(question: impl Into<String>, options: &[&str]) -> Self {
        RecoveryDecision::AskUser {
            question: question.into(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    pub fn replan(suggestion: impl Into<String>) -> Self {
        RecoveryDecision::Replan {
            suggestion: suggestion.into(),
            alternative_cwd: None,
            constraint: None,
        }
    }
}
