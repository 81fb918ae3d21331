//! Configuration for penkit
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML files, chosen by extension, stored in the platform config directory
//! by default.
//!
//! Configuration is organized into sections:
//! - Connection settings (port, baud rate, reconnection)
//! - Device driver tuning for the EBB
//! - Plan preparation options
//! - Machine geometry
//! - Session behaviour

use crate::error::{ConfigError, SettingsError, SettingsResult};
use penkit_communication::EbbConfig;
use penkit_planner::{MachineProfile, PlanOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port to use. When unset, the first EBB found is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Baud rate for the serial link
    pub baud_rate: u32,
    /// Delay between attempts to find or reopen the device
    pub reconnect_delay_ms: u64,
    /// Read timeout of the serial link
    pub read_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            reconnect_delay_ms: 5000,
            read_timeout_ms: 10,
        }
    }
}

impl ConnectionSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Multiplier on motion durations when plotting without a device.
    /// 0 runs simulations instantly.
    pub simulation_time_scale: f64,
    /// Buffer size of the notification channel
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            simulation_time_scale: 1.0,
            event_capacity: 256,
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// EBB driver tuning
    pub device: EbbConfig,
    /// Plan preparation options
    pub plan: PlanOptions,
    /// Machine geometry
    pub machine: MachineProfile,
    /// Session behaviour
    pub session: SessionSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    if path.extension().is_some_and(|ext| ext == "json") {
        Ok(Format::Json)
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        Ok(Format::Toml)
    } else {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Err(ConfigError::UnsupportedFormat(ext).into())
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// The platform's penkit config file, e.g. `~/.config/penkit/config.toml`.
    pub fn default_path() -> SettingsResult<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            ConfigError::UnsupportedPlatform("no config directory".to_string())
        })?;
        Ok(dir.join("penkit").join("config.toml"))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let format = format_of(path)?;

        let content = match format {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SettingsError::ConfigDirectory(e.to_string()))?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if self.connection.read_timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.read_timeout_ms",
                "must be > 0",
            ));
        }

        self.device
            .validate()
            .map_err(|e| SettingsError::invalid("device", e))?;
        self.plan
            .validate()
            .map_err(|e| SettingsError::invalid("plan", e))?;

        if !(self.machine.steps_per_mm > 0.0) {
            return Err(SettingsError::invalid("machine.steps_per_mm", "must be > 0"));
        }

        let scale = self.session.simulation_time_scale;
        if !(scale >= 0.0) || !scale.is_finite() {
            return Err(ConfigError::ValueOutOfRange {
                key: "session.simulation_time_scale".to_string(),
                value: scale.to_string(),
            }
            .into());
        }
        if self.session.event_capacity == 0 {
            return Err(SettingsError::invalid(
                "session.event_capacity",
                "must be > 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.device.microstepping_mode, 2);
        assert_eq!(config.plan.pen_up_height, 50.0);
        assert_eq!(config.machine, MachineProfile::AXIDRAW);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::new();
        config.connection.port = Some("/dev/ttyACM0".to_string());
        config.plan.path_join_radius = 0.25;
        config.device.xm_timestep_ms = 20;
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.session.simulation_time_scale = 0.0;
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[plan]\npen_down_height = 70.0\n").unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.plan.pen_down_height, 70.0);
        assert_eq!(loaded.plan.pen_up_height, 50.0);
        assert_eq!(loaded.connection, ConnectionSettings::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let err = Config::new().save_to_file(&path).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Config(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[device]\nmicrostepping_mode = 9\n").unwrap();
        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidSetting { ref key, .. } if key == "device"));

        std::fs::write(&path, "[plan]\npen_down_acceleration = 0.0\n").unwrap();
        assert!(Config::load_from_file(&path).is_err());
    }

    #[test]
    fn test_invalid_values_rejected_on_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::new();
        config.session.simulation_time_scale = -1.0;
        assert!(config.save_to_file(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
