//! Runtime settings
//!
//! Tunables for the registry and change notifier, plus the default log filter
//! used by the `datasource-check` binary. Stored as TOML under the platform
//! config directory:
//!
//! - **Linux**: `~/.config/ui-datasource/settings.toml`
//! - **macOS**: `~/Library/Application Support/ui-datasource/settings.toml`
//! - **Windows**: `%APPDATA%\ui-datasource\settings.toml`

use crate::error::{DatasourceError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "ui-datasource";

/// Settings filename
pub const SETTINGS_FILE: &str = "settings.toml";

/// Default number of drained change events kept for diagnostics
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 256;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Registry and notifier settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasourceSettings {
    /// Drained change events kept in the notifier's log (0 disables the log)
    pub event_log_capacity: usize,

    /// Bound on queued registry mutations; unbounded when absent
    pub queue_capacity: Option<usize>,

    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for DatasourceSettings {
    fn default() -> Self {
        Self {
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            queue_capacity: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Path of the settings file in the platform config directory
pub fn settings_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(SETTINGS_FILE))
}

impl DatasourceSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {:?}", path))?;

        toml::from_str(&content)
            .map_err(|e| DatasourceError::Config(e.to_string()))
            .with_context(|| format!("Failed to parse settings {:?}", path))
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DatasourceError::Serialization(e.to_string()))
            .context("Failed to serialize settings")?;

        std::fs::write(path, content).with_context(|| format!("Failed to write settings {:?}", path))
    }
}
