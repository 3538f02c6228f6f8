//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::timer::TimerConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Timer defaults
    pub timer: TimerConfig,
}

/// Only the log level, read before logging is set up
#[derive(Debug, Default, Deserialize)]
struct LogLevelOnly {
    #[serde(rename = "log-level", default)]
    log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, silently ignoring any problem
    ///
    /// Runs before logging is initialized, so failures cannot be reported.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => Self::candidates().into_iter().find(|p| p.exists())?,
        };
        let content = fs::read_to_string(path).ok()?;
        serde_yaml::from_str::<LogLevelOnly>(&content).ok()?.log_level
    }

    /// Project-local `.coopsync.yml`, then `~/.config/coopsync/coopsync.yml`
    fn candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(".coopsync.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("coopsync").join("coopsync.yml"));
        }
        candidates
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.log_level.is_none());
        assert_eq!(config.timer, TimerConfig::default());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
timer:
  default-identifier: app.shutdown
  min-tick-interval-ms: 5
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.timer.default_identifier.as_str(), "app.shutdown");
        assert_eq!(config.timer.min_tick_interval_ms, 5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
timer:
  min-tick-interval-ms: 10
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.timer.min_tick_interval_ms, 10);

        // Defaults for unspecified
        assert_eq!(config.timer.default_identifier.as_str(), "worker.exit");
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log-level: warn\ntimer:\n  min-tick-interval-ms: 7").unwrap();
        let path = file.path().to_path_buf();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.timer.min_tick_interval_ms, 7);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_explicit_path_errors_propagate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timer: [not, a, map]").unwrap();
        let path = file.path().to_path_buf();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load config"));
        assert!(Config::load_log_level(Some(&path)).is_none());
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let path = PathBuf::from("/nonexistent/coopsync.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
