//! Penkit Settings Crate
//!
//! Handles configuration loading, validation and persistence.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, SessionSettings};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
