//! Configuration file resolution
//!
//! Config file lookup follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/<app>/config.toml`)
//! 4. None (built-in defaults are used)

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve the config file path for `app_name`
///
/// Returns `Ok(None)` when no file is configured and the platform default
/// does not exist. An explicitly requested file (CLI or env) that does not
/// exist is an error.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf(), "command line");
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path), env_var_name);
        }
    }

    if let Some(path) = default_config_path(app_name) {
        if path.exists() {
            debug!("Using platform config file {:?}", path);
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Platform config file location: `~/.config/<app>/config.toml` on Linux,
/// the equivalent user config directory elsewhere
pub fn default_config_path(app_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(app_name).join("config.toml"))
}

fn require_existing(path: PathBuf, source: &str) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!(
            "Config file {:?} (from {}) does not exist",
            path, source
        )))
    }
}

/// Read a TOML file and deserialize it
pub fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {:?}: {}", path, e)))
}
