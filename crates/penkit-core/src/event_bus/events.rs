//! Event type definitions for the event bus.
//!
//! Events are cloneable and serializable so observers on other transports
//! can forward them unchanged.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::plan::Plan;

/// Notifications published by a plot session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotEvent {
    /// A device was attached, or detached when `path` is `None`.
    DeviceAttached {
        /// Serial port name of the attached device.
        path: Option<String>,
    },
    /// The pause state changed.
    PauseChanged {
        /// Whether the plot is now paused.
        paused: bool,
    },
    /// A motion is about to execute.
    Progress {
        /// Index of the motion about to run.
        motion_index: usize,
        /// Number of motions in the plan.
        total: usize,
    },
    /// A plot was accepted and is starting.
    PlanAccepted {
        /// The accepted plan.
        plan: Arc<Plan>,
    },
    /// Every motion of the plan ran.
    PlotFinished,
    /// The plot was cancelled before completion.
    PlotCancelled,
    /// The plot ended because of a device or transport failure.
    PlotFailed {
        /// Human-readable failure detail.
        message: String,
    },
    /// Motors were disabled and the plot abandoned.
    Limped,
}

impl PlotEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            PlotEvent::DeviceAttached { .. } => EventCategory::Device,
            PlotEvent::PlotFailed { .. } => EventCategory::Error,
            PlotEvent::PauseChanged { .. }
            | PlotEvent::Progress { .. }
            | PlotEvent::PlanAccepted { .. }
            | PlotEvent::PlotFinished
            | PlotEvent::PlotCancelled
            | PlotEvent::Limped => EventCategory::Plot,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            PlotEvent::DeviceAttached { path: Some(path) } => format!("Device attached: {}", path),
            PlotEvent::DeviceAttached { path: None } => "Device detached".to_string(),
            PlotEvent::PauseChanged { paused: true } => "Paused".to_string(),
            PlotEvent::PauseChanged { paused: false } => "Resumed".to_string(),
            PlotEvent::Progress {
                motion_index,
                total,
            } => format!("Motion {}/{}", motion_index + 1, total),
            PlotEvent::PlanAccepted { plan } => format!(
                "Plan accepted: {} motions, {:.1}s",
                plan.len(),
                plan.duration()
            ),
            PlotEvent::PlotFinished => "Plot finished".to_string(),
            PlotEvent::PlotCancelled => "Plot cancelled".to_string(),
            PlotEvent::PlotFailed { message } => format!("Plot failed: {}", message),
            PlotEvent::Limped => "Motors disabled".to_string(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Device attach and detach.
    Device,
    /// Plot lifecycle and progress.
    Plot,
    /// Failures.
    Error,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Device => write!(f, "Device"),
            EventCategory::Plot => write!(f, "Plot"),
            EventCategory::Error => write!(f, "Error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_category() {
        let event = PlotEvent::DeviceAttached {
            path: Some("/dev/ttyACM0".to_string()),
        };
        assert_eq!(event.category(), EventCategory::Device);
        assert_eq!(PlotEvent::PlotCancelled.category(), EventCategory::Plot);
        assert_eq!(
            PlotEvent::PlotFailed {
                message: "x".to_string()
            }
            .category(),
            EventCategory::Error
        );
    }

    #[test]
    fn test_event_description() {
        let event = PlotEvent::Progress {
            motion_index: 2,
            total: 10,
        };
        assert_eq!(event.description(), "Motion 3/10");
        assert_eq!(
            PlotEvent::DeviceAttached { path: None }.description(),
            "Device detached"
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = PlotEvent::PauseChanged { paused: true };
        let json = serde_json::to_string(&event).expect("Should serialize");
        assert!(json.contains("pause_changed"));
        let parsed: PlotEvent = serde_json::from_str(&json).expect("Should deserialize");
        assert!(matches!(parsed, PlotEvent::PauseChanged { paused: true }));

        let event = PlotEvent::PlanAccepted {
            plan: Arc::new(Plan::default()),
        };
        let json = serde_json::to_string(&event).expect("Should serialize");
        let parsed: PlotEvent = serde_json::from_str(&json).expect("Should deserialize");
        assert!(matches!(parsed, PlotEvent::PlanAccepted { plan } if plan.is_empty()));
    }
}
