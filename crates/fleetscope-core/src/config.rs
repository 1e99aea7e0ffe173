//! Deployment configuration
//!
//! Every tunable of the engine lives here (poll and playback timing, movement
//! threshold, provider field aliases, status hint vocabulary) so it can be
//! adjusted per deployment without touching the algorithms. Stored as JSON;
//! missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::reconcile::{all_statuses, StatusFilter, DEFAULT_FIT_PADDING, DEFAULT_POSITION_EPSILON};
use crate::telemetry::{ClassifierRules, FieldAliases};

/// Errors that can occur while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Tracking provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL of the provider API
    pub base_url: String,
    /// Path of the live positions endpoint
    pub live_path: String,
    /// Path of the history endpoint
    pub history_path: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Optional API key sent as `x-api-key`
    pub api_key: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            live_path: "vehicles/live".to_string(),
            history_path: "vehicles/history".to_string(),
            timeout_ms: 10_000,
            api_key: None,
        }
    }
}

/// Live map behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Poll period in milliseconds
    pub poll_interval_ms: u64,
    /// Position changes at or below this many degrees are noise
    pub position_epsilon_deg: f64,
    /// Relative padding for fit-bounds
    pub fit_bounds_padding: f64,
    /// Statuses shown when a view opens
    pub default_filter: StatusFilter,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 15_000,
            position_epsilon_deg: DEFAULT_POSITION_EPSILON,
            fit_bounds_padding: DEFAULT_FIT_PADDING,
            default_filter: all_statuses(),
        }
    }
}

impl LiveSettings {
    /// Poll period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Trip playback behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Tick period at x1, in milliseconds
    pub base_interval_ms: u64,
    /// Speed multipliers offered to the user; the first is the default
    pub speed_multipliers: Vec<u32>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            base_interval_ms: 400,
            speed_multipliers: vec![2, 4, 8],
        }
    }
}

impl PlaybackSettings {
    /// Tick period at x1
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }
}

/// Complete FleetScope configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub provider: ProviderSettings,
    pub live: LiveSettings,
    pub playback: PlaybackSettings,
    pub fields: FieldAliases,
    pub classifier: ClassifierRules,
}

impl FleetConfig {
    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: FleetConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, or the defaults if it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.live.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("live.poll_interval_ms", "must be greater than zero"));
        }
        if !non_negative(self.live.position_epsilon_deg) {
            return Err(ConfigError::invalid(
                "live.position_epsilon_deg",
                "must be a non-negative number",
            ));
        }
        if !non_negative(self.live.fit_bounds_padding) {
            return Err(ConfigError::invalid(
                "live.fit_bounds_padding",
                "must be a non-negative number",
            ));
        }
        if self.playback.base_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "playback.base_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.playback.speed_multipliers.is_empty() {
            return Err(ConfigError::invalid(
                "playback.speed_multipliers",
                "at least one multiplier is required",
            ));
        }
        if self.playback.speed_multipliers.contains(&0) {
            return Err(ConfigError::invalid(
                "playback.speed_multipliers",
                "multipliers must be greater than zero",
            ));
        }
        if self.fields.vehicle_id.is_empty() || self.fields.coordinates.is_empty() {
            return Err(ConfigError::invalid(
                "fields",
                "vehicle id and coordinate aliases are required",
            ));
        }
        Ok(())
    }
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::VehicleStatus;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = FleetConfig::default();
        config.validate().unwrap();
        assert_eq!(config.live.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.playback.base_interval(), Duration::from_millis(400));
        assert_eq!(config.playback.speed_multipliers, vec![2, 4, 8]);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"live": {"poll_interval_ms": 5000, "default_filter": ["RUNNING"]},
                "fields": {"speed": ["velocity"]}}"#,
        )
        .unwrap();

        let config = FleetConfig::load(&path).unwrap();
        assert_eq!(config.live.poll_interval_ms, 5000);
        assert_eq!(config.live.position_epsilon_deg, DEFAULT_POSITION_EPSILON);
        assert_eq!(
            config.live.default_filter,
            [VehicleStatus::Running].into_iter().collect::<StatusFilter>()
        );
        assert_eq!(config.fields.speed, vec!["velocity".to_string()]);
        assert!(!config.fields.vehicle_id.is_empty());
        assert_eq!(config.playback.base_interval_ms, 400);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = FleetConfig::default();
        config.provider.base_url = "https://tracker.example.org".into();
        config.playback.speed_multipliers = vec![1, 2];
        config.save(&path).unwrap();

        let loaded = FleetConfig::load(&path).unwrap();
        assert_eq!(loaded.provider.base_url, "https://tracker.example.org");
        assert_eq!(loaded.playback.speed_multipliers, vec![1, 2]);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempdir().unwrap();
        let config = FleetConfig::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(config.live.poll_interval_ms, 15_000);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = FleetConfig::default();
        config.playback.speed_multipliers = vec![2, 0];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "playback.speed_multipliers"
        ));

        let mut config = FleetConfig::default();
        config.live.position_epsilon_deg = -1.0;
        assert!(config.validate().is_err());

        let mut config = FleetConfig::default();
        config.live.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(FleetConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}
