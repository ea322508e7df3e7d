//! Load `[env]` table from `$XDG_CONFIG_HOME/<app>/config.toml`.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::LoadError;

/// `$XDG_CONFIG_HOME/<app>/config.toml`, falling back to `~/.config` when the variable is
/// unset, empty or relative.
pub fn config_path(app_name: &str) -> Result<PathBuf, LoadError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .ok_or_else(|| LoadError::XdgPath("no home directory".to_string()))?;
    Ok(base.join(app_name).join("config.toml"))
}

#[derive(serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Returns the file read (if any) and the `[env]` pairs. A missing file or section yields an
/// empty map.
pub fn load_env_map(
    app_name: &str,
) -> Result<(Option<PathBuf>, HashMap<String, String>), LoadError> {
    let path = config_path(app_name)?;
    if !path.is_file() {
        return Ok((None, HashMap::new()));
    }
    let content = std::fs::read_to_string(&path).map_err(LoadError::XdgRead)?;
    let config: ConfigFile = toml::from_str(&content)?;
    Ok((Some(path), config.env))
}
