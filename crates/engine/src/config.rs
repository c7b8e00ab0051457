// Runner settings
// Loaded from settings.toml (CLI: ~/.config/tabstep/settings.toml or --config)

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What a column strategy leaves behind when it fails partway through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFailureMode {
    /// Restore every cell the failed call already changed.
    #[default]
    Rollback,
    /// Leave earlier cells changed (no edit is recorded for them).
    KeepApplied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Oldest steps are dropped beyond this many. Unbounded when unset.
    pub max_steps: Option<usize>,
    /// Oldest edits in a step's log are dropped beyond this many. Unbounded
    /// when unset.
    pub max_edits_per_step: Option<usize>,
    pub column_failure: ColumnFailureMode,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_edits_per_step: None,
            column_failure: ColumnFailureMode::Rollback,
        }
    }
}

impl RunnerSettings {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let settings: RunnerSettings =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == Some(0) {
            return Err(ConfigError::Validation("max_steps must be at least 1".into()));
        }
        if self.max_edits_per_step == Some(0) {
            return Err(ConfigError::Validation(
                "max_edits_per_step must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
