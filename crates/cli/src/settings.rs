//! Locating and loading `settings.toml` for the CLI.

use std::path::{Path, PathBuf};

use tabstep_engine::config::RunnerSettings;
use tabstep_engine::error::ConfigError;

/// Per-user configuration directory (`~/.config/tabstep` on Linux).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tabstep")
}

pub fn default_settings_path() -> PathBuf {
    config_dir().join("settings.toml")
}

/// Load runner settings.
///
/// An explicit path must exist. The per-user default is optional: when it is
/// missing the built-in defaults apply.
pub fn load_settings(explicit: Option<&Path>) -> Result<RunnerSettings, ConfigError> {
    if let Some(path) = explicit {
        return RunnerSettings::load(path);
    }
    let path = default_settings_path();
    if path.exists() {
        log::debug!("loading settings from {}", path.display());
        RunnerSettings::load(&path)
    } else {
        Ok(RunnerSettings::default())
    }
}
