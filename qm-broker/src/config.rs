//! Broker configuration resolution
//!
//! Resolution priority for each value:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (handled by the CLI parser)
//! 3. TOML config file
//! 4. Compiled default (fallback)

use qm_common::{Error, Result};
use std::path::PathBuf;

/// Where the remote document lives when nothing else is configured.
pub const DEFAULT_CONFIG_URL: &str =
    "https://raw.githubusercontent.com/quiet-mode/quiet-mode-config/refs/heads/main/config.json";

/// Resolve the data folder holding the key/value store.
pub fn resolve_root_folder(cli_arg: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(path.clone());
    }

    if let Some(value) = config_file_value("root_folder")? {
        return Ok(PathBuf::from(value));
    }

    Ok(default_root_folder())
}

/// Resolve the remote configuration URL.
pub fn resolve_config_url(cli_arg: Option<String>) -> Result<String> {
    if let Some(url) = cli_arg {
        return Ok(url);
    }

    if let Some(value) = config_file_value("config_url")? {
        return Ok(value);
    }

    Ok(DEFAULT_CONFIG_URL.to_string())
}

/// Read one string key from the TOML config file, if the file exists.
fn config_file_value(key: &str) -> Result<Option<String>> {
    let Some(path) = config_file_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)?;
    let parsed: toml::Value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid config file {}: {e}", path.display())))?;

    Ok(parsed.get(key).and_then(|v| v.as_str()).map(str::to_string))
}

fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("qm").join("config.toml"))
}

fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("qm"))
        .unwrap_or_else(|| PathBuf::from("./qm_data"))
}
