//! Acceleration, tooling and machine profiles.

use penkit_core::PlanError;
use serde::{Deserialize, Serialize};

/// Kinematic limits for one kind of motion (pen-down drawing or pen-up
/// travel). Units follow the points being planned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationProfile {
    pub acceleration: f64,
    pub maximum_velocity: f64,
    pub cornering_factor: f64,
}

impl AccelerationProfile {
    pub fn new(acceleration: f64, maximum_velocity: f64, cornering_factor: f64) -> Self {
        Self {
            acceleration,
            maximum_velocity,
            cornering_factor,
        }
    }

    /// Reject profiles the planner would divide by zero or go negative with.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !(self.acceleration > 0.0) {
            return Err(PlanError::InvalidProfile {
                reason: format!("acceleration must be > 0, but was {}", self.acceleration),
            });
        }
        if !(self.maximum_velocity > 0.0) {
            return Err(PlanError::InvalidProfile {
                reason: format!(
                    "maximum velocity must be > 0, but was {}",
                    self.maximum_velocity
                ),
            });
        }
        if !(self.cornering_factor >= 0.0) {
            return Err(PlanError::InvalidProfile {
                reason: format!(
                    "cornering factor must be >= 0, but was {}",
                    self.cornering_factor
                ),
            });
        }
        Ok(())
    }

    /// The same limits expressed in a unit `factor` times smaller.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            acceleration: self.acceleration * factor,
            maximum_velocity: self.maximum_velocity * factor,
            cornering_factor: self.cornering_factor * factor,
        }
    }
}

/// Everything the planner needs to know about the pen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolingProfile {
    pub pen_down: AccelerationProfile,
    pub pen_up: AccelerationProfile,
    /// Servo position for travel.
    pub pen_up_pos: i32,
    /// Servo position for drawing.
    pub pen_down_pos: i32,
    /// Servo position the pen rests at before and after a plot.
    pub pen_home_pos: i32,
    /// Seconds.
    pub pen_drop_duration: f64,
    /// Seconds.
    pub pen_lift_duration: f64,
}

/// Fixed characteristics of the plotter hardware.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineProfile {
    pub steps_per_mm: f64,
    /// Servo position at 100% pen height, in 83 ns PWM units.
    pub pen_servo_min: i32,
    /// Servo position at 0% pen height.
    pub pen_servo_max: i32,
}

impl MachineProfile {
    /// AxiDraw v2/v3 geometry on an EBB board.
    pub const AXIDRAW: MachineProfile = MachineProfile {
        steps_per_mm: 5.0,
        pen_servo_min: 7500,
        pen_servo_max: 28000,
    };

    /// Servo position for a pen height given in percent.
    pub fn pen_pct_to_pos(&self, pct: f64) -> i32 {
        let t = pct / 100.0;
        (f64::from(self.pen_servo_min) * t + f64::from(self.pen_servo_max) * (1.0 - t)).round()
            as i32
    }

    /// Servo position the pen is parked at between plots.
    pub fn pen_home_pos(&self) -> i32 {
        self.pen_pct_to_pos(0.0)
    }
}

impl Default for MachineProfile {
    fn default() -> Self {
        Self::AXIDRAW
    }
}
