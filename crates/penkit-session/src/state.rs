//! Session state and configuration.

use penkit_communication::EbbConfig;
use penkit_core::EventBusConfig;
use penkit_planner::MachineProfile;
use serde::{Deserialize, Serialize};

/// Where a plot session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No plot running.
    Idle,
    /// A plot is executing.
    Plotting,
    /// Pause requested; waiting for the pen to be up.
    PausePending,
    /// Stopped at a motion boundary with the pen up.
    Paused,
    /// Cancel requested; the plot stops at the next motion boundary.
    Cancelling,
    /// Motors were disabled by request; carriage position is unknown.
    Limp,
}

impl SessionState {
    /// Whether a plot task is executing in this state.
    pub fn is_plotting(&self) -> bool {
        matches!(
            self,
            SessionState::Plotting
                | SessionState::PausePending
                | SessionState::Paused
                | SessionState::Cancelling
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Plotting => write!(f, "Plotting"),
            SessionState::PausePending => write!(f, "Pause pending"),
            SessionState::Paused => write!(f, "Paused"),
            SessionState::Cancelling => write!(f, "Cancelling"),
            SessionState::Limp => write!(f, "Limp"),
        }
    }
}

/// Everything a session needs to build plotters and its event bus.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device: EbbConfig,
    pub machine: MachineProfile,
    /// Multiplier on motion durations for simulated plots.
    pub simulation_time_scale: f64,
    pub events: EventBusConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: EbbConfig::default(),
            machine: MachineProfile::default(),
            simulation_time_scale: 1.0,
            events: EventBusConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_plotting() {
        assert!(!SessionState::Idle.is_plotting());
        assert!(!SessionState::Limp.is_plotting());
        assert!(SessionState::PausePending.is_plotting());
        assert!(SessionState::Cancelling.is_plotting());
    }
}
