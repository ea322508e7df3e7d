//! Plan steps and their results.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// External skill a step invokes.
///
/// Serialized snake_case; parsing also accepts dotted, hyphenated and camel-cased
/// spellings (`shell.run`, `browser-act`, `uiFindAndClick`) that LLMs tend to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Skill {
    ShellRun,
    BrowserAct,
    UiFindAndClick,
    UiTypeText,
    UiWaitFor,
    /// Inline LLM synthesis over prior outputs; never sent to the executor.
    Synthesize,
}

impl Skill {
    pub const ALL: [Skill; 6] = [
        Skill::ShellRun,
        Skill::BrowserAct,
        Skill::UiFindAndClick,
        Skill::UiTypeText,
        Skill::UiWaitFor,
        Skill::Synthesize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Skill::ShellRun => "shell_run",
            Skill::BrowserAct => "browser_act",
            Skill::UiFindAndClick => "ui_find_and_click",
            Skill::UiTypeText => "ui_type_text",
            Skill::UiWaitFor => "ui_wait_for",
            Skill::Synthesize => "synthesize",
        }
    }

    /// Lenient parse; returns `None` for names that are not a known skill.
    pub fn parse(name: &str) -> Option<Skill> {
        let mut normalized = String::with_capacity(name.len() + 4);
        let mut prev_lower = false;
        for c in name.trim().chars() {
            match c {
                '.' | '-' | ' ' | '/' => normalized.push('_'),
                c if c.is_ascii_uppercase() => {
                    if prev_lower {
                        normalized.push('_');
                    }
                    normalized.push(c.to_ascii_lowercase());
                }
                c => normalized.push(c),
            }
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
        match normalized.as_str() {
            "shell_run" | "shell" | "run_shell" => Some(Skill::ShellRun),
            "browser_act" | "browser" => Some(Skill::BrowserAct),
            "ui_find_and_click" | "ui_click" => Some(Skill::UiFindAndClick),
            "ui_type_text" | "ui_type" => Some(Skill::UiTypeText),
            "ui_wait_for" | "ui_wait" => Some(Skill::UiWaitFor),
            "synthesize" | "synthesise" => Some(Skill::Synthesize),
            _ => None,
        }
    }

    pub fn is_browser(&self) -> bool {
        matches!(self, Skill::BrowserAct)
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Skill {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Skill::parse(&value).ok_or_else(|| format!("unknown skill: {}", value))
    }
}

/// One structured action in a plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillStep {
    pub skill: Skill,
    #[serde(default)]
    pub args: Map<String, Value>,
    /// When true, a failure advances the cursor instead of triggering recovery.
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub description: String,
}

impl SkillStep {
    pub fn new(skill: Skill, args: Map<String, Value>, description: impl Into<String>) -> Self {
        Self {
            skill,
            args,
            optional: false,
            description: description.into(),
        }
    }

    pub fn optional(self) -> Self {
        Self {
            optional: true,
            ..self
        }
    }

    /// String argument by key, if present and a string.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// Browser session id argument, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.arg_str("session_id")
    }

    /// Returns a copy with `patch` merged over the current args.
    pub fn patched(&self, patch: &Map<String, Value>) -> Self {
        let mut args = self.args.clone();
        for (k, v) in patch {
            args.insert(k.clone(), v.clone());
        }
        Self {
            args,
            ..self.clone()
        }
    }
}

/// Ordered steps produced by one planner invocation.
pub type SkillPlan = Vec<SkillStep>;

/// Outcome of one dispatch attempt. Append-only in the state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub skill: Skill,
    pub args: Map<String, Value>,
    pub description: String,
    pub ok: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl StepResult {
    /// Failed attempt with only an error message (executor unreachable, LLM failure).
    pub fn failure(step_index: usize, step: &SkillStep, error: impl Into<String>) -> Self {
        Self {
            step_index,
            skill: step.skill,
            args: step.args.clone(),
            description: step.description.clone(),
            ok: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            result: None,
            url: None,
            error: Some(error.into()),
            execution_time_ms: 0,
        }
    }

    /// Best human-readable output: stdout, else a textual result, else the url.
    pub fn output_text(&self) -> String {
        if !self.stdout.trim().is_empty() {
            return self.stdout.trim().to_string();
        }
        match &self.result {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.trim().to_string(),
            Some(Value::Null) | None => {}
            Some(v) => return v.to_string(),
        }
        self.url.clone().unwrap_or_default()
    }

    /// Error text lowercased together with stderr; what failure patterns are matched on.
    pub fn failure_text(&self) -> String {
        let mut text = self.error.clone().unwrap_or_default();
        if !self.stderr.is_empty() {
            text.push('\n');
            text.push_str(&self.stderr);
        }
        text.to_lowercase()
    }

    /// Page title reported by a browser step, if any.
    pub fn page_title(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|r| r.get("title"))
            .and_then(Value::as_str)
    }
}
