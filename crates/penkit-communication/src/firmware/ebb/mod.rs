//! EiBotBoard (EBB) firmware support
//!
//! - `protocol`: line framing and the FIFO of pending requests
//! - `steps`: microstepping, step accumulation and LM rate units
//! - `version`: firmware version parsing and capability checks
//! - `driver`: the [`Ebb`] device handle that executes plans

mod driver;
pub mod protocol;
pub mod steps;
pub mod version;

pub use driver::{Ebb, Voltages};
pub use version::FirmwareVersion;

use penkit_core::{DeviceError, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Driver tuning for an EBB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EbbConfig {
    /// EM microstepping mode used for plots, 1 (16x) to 5 (full steps).
    pub microstepping_mode: u8,
    /// Resampling period when the firmware lacks LM, in milliseconds.
    pub xm_timestep_ms: u64,
    /// Step rate for `HM` after a cancelled plot.
    pub home_rate: u32,
    /// Servo rate used to lift the pen home after a cancelled plot.
    pub cancel_pen_rate: u32,
    /// Servo rate for the pen move before a plot starts.
    pub pre_plot_pen_rate: u32,
    /// Delay after the pre-plot pen move, in milliseconds.
    pub pre_plot_pen_delay_ms: u32,
    /// Pause between `QM` polls while waiting for the motors to stop.
    pub idle_poll_ms: u64,
    /// Sleep of the I/O loop between read attempts.
    pub io_poll_ms: u64,
}

impl Default for EbbConfig {
    fn default() -> Self {
        Self {
            microstepping_mode: 2,
            xm_timestep_ms: 15,
            home_rate: 5000,
            cancel_pen_rate: 1000,
            pre_plot_pen_rate: 1000,
            pre_plot_pen_delay_ms: 1000,
            idle_poll_ms: 10,
            io_poll_ms: 2,
        }
    }
}

impl EbbConfig {
    pub fn validate(&self) -> Result<()> {
        steps::step_multiplier(self.microstepping_mode)?;
        if self.xm_timestep_ms == 0 {
            return Err(Error::other("xm_timestep_ms must be > 0"));
        }
        if self.io_poll_ms == 0 {
            return Err(Error::other("io_poll_ms must be > 0"));
        }
        if self.home_rate == 0 {
            return Err(DeviceError::InvalidHomeRate.into());
        }
        Ok(())
    }

    pub fn xm_timestep(&self) -> Duration {
        Duration::from_millis(self.xm_timestep_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn io_poll(&self) -> Duration {
        Duration::from_millis(self.io_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EbbConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.xm_timestep(), Duration::from_millis(15));
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let config = EbbConfig {
            microstepping_mode: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_precondition());
    }

    #[test]
    fn test_zero_home_rate_rejected() {
        let config = EbbConfig {
            home_rate: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Device(DeviceError::InvalidHomeRate)));
        assert_eq!(err.to_string(), "Home step rate must be greater than 0");
    }
}
