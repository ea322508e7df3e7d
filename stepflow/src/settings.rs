//! Runtime settings read from the process environment.
//!
//! [`Settings::load`] first applies `~/.config/stepflow/config.toml` `[env]` and a project
//! `.env` (see the `config` crate), then reads the variables below. Malformed numbers fall
//! back to their defaults with a warning.
//!
//! | variable | default |
//! |----------|---------|
//! | `STEPFLOW_MAX_ITERATIONS` | 50 |
//! | `STEPFLOW_STEP_TIMEOUT_MS` | 30000 |
//! | `STEPFLOW_EXECUTOR_URL` | `http://127.0.0.1:4723` |
//! | `STEPFLOW_MAX_REPLANS` | 3 |
//! | `STEPFLOW_SEARCH_COMMANDS` | (none; comma list added to the built-in search commands) |
//! | `STEPFLOW_TRACE_SNAPSHOT_CHARS` | 2000 |
//! | `STEPFLOW_LLM_MODE` | `auto` |
//! | `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `STEPFLOW_LLM_MODEL` | online backend |
//! | `STEPFLOW_LOCAL_LLM_URL`, `STEPFLOW_LOCAL_LLM_MODEL` | local backend |

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ITERATIONS: usize = 50;
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_EXECUTOR_URL: &str = "http://127.0.0.1:4723";
pub const DEFAULT_MAX_REPLANS: u32 = 3;
pub const DEFAULT_TRACE_SNAPSHOT_CHARS: usize = 2000;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ONLINE_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LOCAL_MODEL: &str = "llama3.1";

/// Which LLM backends may be selected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Online if configured, else local if configured, else placeholder.
    #[default]
    Auto,
    Online,
    Local,
    /// Placeholder only; every LLM-backed step fails fast.
    Offline,
}

impl FromStr for BackendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "online" | "openai" => Ok(Self::Online),
            "local" => Ok(Self::Local),
            "offline" | "none" => Ok(Self::Offline),
            _ => Err(format!(
                "unknown llm mode: {} (use auto, online, local, or offline)",
                s
            )),
        }
    }
}

/// LLM backend configuration; immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub mode: BackendMode,
    /// Skipped when serializing so saved settings never hold the key.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub local_url: Option<String>,
    pub local_model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            mode: BackendMode::Auto,
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_ONLINE_MODEL.to_string(),
            local_url: None,
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
        }
    }
}

/// Workflow settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub max_iterations: usize,
    pub step_timeout_ms: u64,
    pub executor_url: String,
    pub max_replans: u32,
    /// Extra command names treated as search tools by the dispatcher.
    pub search_commands: Vec<String>,
    pub trace_snapshot_chars: usize,
    pub llm: LlmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            executor_url: DEFAULT_EXECUTOR_URL.to_string(),
            max_replans: DEFAULT_MAX_REPLANS,
            search_commands: Vec::new(),
            trace_snapshot_chars: DEFAULT_TRACE_SNAPSHOT_CHARS,
            llm: LlmSettings::default(),
        }
    }
}

impl Settings {
    /// Applies config files to the environment, then reads settings from it.
    ///
    /// `override_dir`: directory holding the `.env` to use instead of the current directory.
    pub fn load(override_dir: Option<&Path>) -> Result<Self, env_config::LoadError> {
        let applied = env_config::load_and_apply("stepflow", override_dir)?;
        tracing::debug!(
            from_dotenv = ?applied.from_dotenv,
            from_xdg = ?applied.from_xdg,
            xdg_file = ?applied.xdg_file,
            "config applied"
        );
        Ok(Self::from_env())
    }

    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup` (key → value); used by `from_env` and tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let d = Self::default();
        let mode = match get("STEPFLOW_LLM_MODE") {
            Some(raw) => raw.parse::<BackendMode>().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to auto llm mode");
                BackendMode::Auto
            }),
            None => BackendMode::Auto,
        };
        Self {
            max_iterations: parse_or(&get, "STEPFLOW_MAX_ITERATIONS", d.max_iterations),
            step_timeout_ms: parse_or(&get, "STEPFLOW_STEP_TIMEOUT_MS", d.step_timeout_ms),
            executor_url: get("STEPFLOW_EXECUTOR_URL").unwrap_or(d.executor_url),
            max_replans: parse_or(&get, "STEPFLOW_MAX_REPLANS", d.max_replans),
            search_commands: get("STEPFLOW_SEARCH_COMMANDS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            trace_snapshot_chars: parse_or(
                &get,
                "STEPFLOW_TRACE_SNAPSHOT_CHARS",
                d.trace_snapshot_chars,
            ),
            llm: LlmSettings {
                mode,
                api_key: get("OPENAI_API_KEY"),
                base_url: get("OPENAI_BASE_URL").unwrap_or(d.llm.base_url),
                model: get("STEPFLOW_LLM_MODEL").unwrap_or(d.llm.model),
                local_url: get("STEPFLOW_LOCAL_LLM_URL"),
                local_model: get("STEPFLOW_LOCAL_LLM_MODEL").unwrap_or(d.llm.local_model),
            },
        }
    }

    pub fn with_executor_url(self, executor_url: impl Into<String>) -> Self {
        Self {
            executor_url: executor_url.into(),
            ..self
        }
    }

    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "malformed setting, using default");
                default
            }
        },
        None => default,
    }
}
