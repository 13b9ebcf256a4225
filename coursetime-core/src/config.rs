//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/coursetime/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/coursetime/` (~/.config/coursetime/)
//! - Data: `$XDG_DATA_HOME/coursetime/` (~/.local/share/coursetime/)
//! - State/Logs: `$XDG_STATE_HOME/coursetime/` (~/.local/state/coursetime/)

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Session tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Catalog file configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session tracking configuration
#[derive(Debug, Deserialize)]
pub struct TrackingConfig {
    /// Per-session ceiling on attributed active time, in seconds
    #[serde(default = "default_active_time_cap")]
    pub active_time_cap_secs: i64,

    /// Default report window when no date range is given, in days
    #[serde(default = "default_report_window_days")]
    pub default_report_window_days: i64,

    /// End reason recorded when the client does not supply one
    #[serde(default = "default_end_reason")]
    pub default_end_reason: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            active_time_cap_secs: default_active_time_cap(),
            default_report_window_days: default_report_window_days(),
            default_end_reason: default_end_reason(),
        }
    }
}

impl TrackingConfig {
    /// Start of the trailing report window ending at `today`.
    ///
    /// Reports without an explicit lower date bound cover the last
    /// `default_report_window_days` days rather than all history.
    pub fn default_window_start(&self, today: NaiveDate) -> NaiveDate {
        today - chrono::Duration::days(self.default_report_window_days)
    }
}

fn default_active_time_cap() -> i64 {
    crate::types::ACTIVE_TIME_CAP_SECS
}

fn default_report_window_days() -> i64 {
    30
}

fn default_end_reason() -> String {
    "navigate".to_string()
}

/// Catalog file configuration
///
/// The catalog TOML describes courses, chapters, lessons, members, and
/// enrollments for standalone deployments where the platform catalog is not
/// reachable as a service.
#[derive(Debug, Deserialize, Default)]
pub struct CatalogConfig {
    /// Path to the catalog TOML file
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/coursetime/config.toml` (~/.config/coursetime/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("coursetime").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/coursetime/` (~/.local/share/coursetime/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("coursetime")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/coursetime/` (~/.local/state/coursetime/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("coursetime")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/coursetime/data.db` (~/.local/share/coursetime/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/coursetime/coursetime.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("coursetime.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracking.active_time_cap_secs, 7200);
        assert_eq!(config.tracking.default_report_window_days, 30);
        assert_eq!(config.tracking.default_end_reason, "navigate");
        assert!(config.catalog.path.is_none());
    }

    #[test]
    fn test_default_window_start() {
        let config = TrackingConfig::default();
        let today = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();
        assert_eq!(
            config.default_window_start(today),
            NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
        );

        let short = TrackingConfig {
            default_report_window_days: 7,
            ..Default::default()
        };
        assert_eq!(
            short.default_window_start(today),
            NaiveDate::from_ymd_opt(2026, 8, 20).unwrap()
        );
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[tracking]
active_time_cap_secs = 3600
default_report_window_days = 7

[catalog]
path = "/srv/lms/catalog.toml"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.tracking.active_time_cap_secs, 3600);
        assert_eq!(config.tracking.default_report_window_days, 7);
        assert_eq!(
            config.catalog.path.as_deref(),
            Some(std::path::Path::new("/srv/lms/catalog.toml"))
        );
        assert_eq!(config.logging.level, "debug");
    }
}
