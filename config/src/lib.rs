//! Load configuration from XDG `config.toml` and project `.env`, then apply to the process
//! environment with priority: **existing env > .env > XDG**.
//!
//! With the `tracing-init` feature, [`tracing_init`] also provides the shared log filter and
//! rolling file writer used by the CLI.

mod dotenv;
#[cfg(feature = "tracing-init")]
pub mod tracing_init;
mod xdg_toml;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use xdg_toml::config_path;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("xdg config path: {0}")]
    XdgPath(String),
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

/// Keys set by [`load_and_apply`], by source. Keys already present in the environment are
/// in neither list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Applied {
    pub from_dotenv: Vec<String>,
    pub from_xdg: Vec<String>,
    /// XDG file that was read, if it existed.
    pub xdg_file: Option<PathBuf>,
}

impl Applied {
    pub fn is_empty(&self) -> bool {
        self.from_dotenv.is_empty() && self.from_xdg.is_empty()
    }
}

/// Loads config from XDG `config.toml` and optional project `.env`, then sets environment
/// variables only for keys that are **not** already set (so existing env has highest priority).
///
/// Order of precedence when a key is missing in the process environment:
/// 1. Value from project `.env` (current directory or `override_dir` if given)
/// 2. Value from `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]` table
///
/// * `app_name`: e.g. `"stepflow"`, used for the XDG path `~/.config/<app_name>/config.toml`.
/// * `override_dir`: if `Some`, look for `.env` in this directory instead of `std::env::current_dir()`.
pub fn load_and_apply(app_name: &str, override_dir: Option<&Path>) -> Result<Applied, LoadError> {
    let (xdg_file, xdg_map) = xdg_toml::load_env_map(app_name)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: Vec<&String> = xdg_map.keys().chain(dotenv_map.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut applied = Applied {
        xdg_file,
        ..Applied::default()
    };
    for key in keys {
        if std::env::var_os(key).is_some() {
            continue;
        }
        if let Some(v) = dotenv_map.get(key) {
            std::env::set_var(key, v);
            applied.from_dotenv.push(key.clone());
        } else if let Some(v) = xdg_map.get(key) {
            std::env::set_var(key, v);
            applied.from_xdg.push(key.clone());
        }
    }

    Ok(applied)
}

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn restore_var(key: &str, prev: Option<String>) {
        match prev {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    fn write_xdg(dir: &Path, app: &str, body: &str) {
        let app_dir = dir.join(app);
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("config.toml"), body).unwrap();
    }

    #[test]
    fn existing_env_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dotenv_dir.path().join(".env"),
            "STEPFLOW_CFG_TEST_EXISTING=from_dotenv\n",
        )
        .unwrap();
        env::set_var("STEPFLOW_CFG_TEST_EXISTING", "from_env");

        let applied = load_and_apply("stepflow-cfg-none", Some(dotenv_dir.path())).unwrap();
        assert_eq!(
            env::var("STEPFLOW_CFG_TEST_EXISTING").as_deref(),
            Ok("from_env")
        );
        assert!(applied.is_empty());
        env::remove_var("STEPFLOW_CFG_TEST_EXISTING");
    }

    #[test]
    fn dotenv_overrides_xdg() {
        let _guard = ENV_LOCK.lock().unwrap();
        let xdg_dir = tempfile::tempdir().unwrap();
        write_xdg(
            xdg_dir.path(),
            "stepflow",
            "[env]\nSTEPFLOW_CFG_TEST_PRIORITY = \"from_xdg\"\nSTEPFLOW_CFG_TEST_XDG_ONLY = \"x\"\n",
        );
        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dotenv_dir.path().join(".env"),
            "STEPFLOW_CFG_TEST_PRIORITY=from_dotenv\n",
        )
        .unwrap();

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        env::remove_var("STEPFLOW_CFG_TEST_PRIORITY");
        env::remove_var("STEPFLOW_CFG_TEST_XDG_ONLY");

        let applied = load_and_apply("stepflow", Some(dotenv_dir.path())).unwrap();
        let val = env::var("STEPFLOW_CFG_TEST_PRIORITY").unwrap();
        let xdg_only = env::var("STEPFLOW_CFG_TEST_XDG_ONLY").unwrap();
        env::remove_var("STEPFLOW_CFG_TEST_PRIORITY");
        env::remove_var("STEPFLOW_CFG_TEST_XDG_ONLY");
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert_eq!(val, "from_dotenv");
        assert_eq!(xdg_only, "x");
        assert_eq!(applied.from_dotenv, vec!["STEPFLOW_CFG_TEST_PRIORITY"]);
        assert_eq!(applied.from_xdg, vec!["STEPFLOW_CFG_TEST_XDG_ONLY"]);
        assert!(applied.xdg_file.is_some());
    }

    #[test]
    fn no_config_anywhere_is_ok() {
        let _guard = ENV_LOCK.lock().unwrap();
        let empty = tempfile::tempdir().unwrap();
        let applied = load_and_apply("stepflow-cfg-nonexistent-app", Some(empty.path())).unwrap();
        assert!(applied.is_empty());
        assert!(applied.xdg_file.is_none());
    }

    #[test]
    fn invalid_xdg_toml_fails_with_xdg_parse_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        let xdg_dir = tempfile::tempdir().unwrap();
        write_xdg(xdg_dir.path(), "stepflow", "invalid [[[\n");

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        let result = load_and_apply("stepflow", None);
        restore_var("XDG_CONFIG_HOME", prev_xdg);

        assert!(matches!(result, Err(LoadError::XdgParse(_))));
    }
}
