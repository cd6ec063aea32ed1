//! Configuration for the taskboard CLI.
//!
//! Settings are layered: `taskboard.toml` → environment → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [store]
//! path = ".taskboard/board.db"
//! poll_interval_ms = 500
//!
//! [board]
//! owner_id = "local"
//! drop_offset_px = 50.0
//! card_height_px = 44.0
//! indicator_height_px = 4.0
//!
//! [logging]
//! level = "warn"
//! mode = "default"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::board::ordering::{CardMetrics, DROP_DISTANCE_OFFSET};
use crate::logging::LogMode;

/// Overrides `[store] path`.
pub const ENV_DB: &str = "TASKBOARD_DB";
/// Overrides `[board] owner_id`.
pub const ENV_OWNER: &str = "TASKBOARD_OWNER";
/// Overrides `[logging] level`.
pub const ENV_LOG: &str = "TASKBOARD_LOG";

const CONFIG_FILE_NAME: &str = "taskboard.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// How often `board watch` re-reads the database for writes made by
    /// other processes; 0 turns polling off
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".taskboard").join("board.db")
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    /// Owner stamped on new projects and tasks
    #[serde(default = "default_owner_id")]
    pub owner_id: String,
    /// Distance from an indicator's top edge to its drop anchor
    #[serde(default = "default_drop_offset_px")]
    pub drop_offset_px: f64,
    #[serde(default = "default_card_height_px")]
    pub card_height_px: f64,
    #[serde(default = "default_indicator_height_px")]
    pub indicator_height_px: f64,
}

fn default_owner_id() -> String {
    "local".to_string()
}

fn default_drop_offset_px() -> f64 {
    DROP_DISTANCE_OFFSET
}

fn default_card_height_px() -> f64 {
    CardMetrics::default().card_height
}

fn default_indicator_height_px() -> f64 {
    CardMetrics::default().indicator_height
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            owner_id: default_owner_id(),
            drop_offset_px: default_drop_offset_px(),
            card_height_px: default_card_height_px(),
            indicator_height_px: default_indicator_height_px(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive, e.g. "warn" or "taskboard=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub mode: LogMode,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            mode: LogMode::default(),
        }
    }
}

/// The complete taskboard.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl BoardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse taskboard.toml")
    }

    /// Load `path` if it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content =
            toml::to_string_pretty(self).context("Failed to serialize taskboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// `<config dir>/taskboard/taskboard.toml`, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskboard").join(CONFIG_FILE_NAME))
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty(ENV_DB) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(owner) = non_empty(ENV_OWNER) {
            self.board.owner_id = owner;
        }
        if let Some(level) = non_empty(ENV_LOG) {
            self.logging.level = level;
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn card_metrics(&self) -> CardMetrics {
        CardMetrics {
            origin_top: 0.0,
            card_height: self.board.card_height_px,
            indicator_height: self.board.indicator_height_px,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.store.poll_interval_ms)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.board.owner_id.trim().is_empty() {
            warnings.push("owner_id must not be empty".to_string());
        }
        if !self.board.drop_offset_px.is_finite() || self.board.drop_offset_px < 0.0 {
            warnings.push(format!(
                "Invalid drop_offset_px {}: should be a non-negative number",
                self.board.drop_offset_px
            ));
        }
        if !self.board.card_height_px.is_finite() || self.board.card_height_px <= 0.0 {
            warnings.push(format!(
                "Invalid card_height_px {}: should be positive",
                self.board.card_height_px
            ));
        }
        if !self.board.indicator_height_px.is_finite() || self.board.indicator_height_px < 0.0 {
            warnings.push(format!(
                "Invalid indicator_height_px {}: should be a non-negative number",
                self.board.indicator_height_px
            ));
        }
        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            warnings.push(format!("Invalid log level '{}': {}", self.logging.level, e));
        }

        warnings
    }
}
