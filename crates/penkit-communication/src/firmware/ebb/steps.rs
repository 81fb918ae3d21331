//! Step and step-rate conversions for the EBB stepper commands.

use glam::DVec2;
use penkit_core::DeviceError;

/// Scale from steps per second to the LM command's rate units: the step
/// accumulator is a 31-bit fraction advanced at 25 kHz.
pub const LM_RATE_SCALE: f64 = 2_147_483_648.0 / 25_000.0;

/// Microsteps per plan step for an EM microstepping mode.
pub fn step_multiplier(mode: u8) -> Result<u32, DeviceError> {
    match mode {
        5 => Ok(1),
        4 => Ok(2),
        3 => Ok(4),
        2 => Ok(8),
        1 => Ok(16),
        _ => Err(DeviceError::InvalidMicrostepping { mode }),
    }
}

/// Split `d` into `(fraction, integer)` with `integer = floor(d)`.
pub fn modf(d: f64) -> (f64, i64) {
    let int_part = d.floor();
    (d - int_part, int_part as i64)
}

/// Carries the sub-step remainder of every move into the next one so no
/// motion is lost to rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepAccumulator {
    error: DVec2,
}

impl StepAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole steps to take for `delta` microsteps, keeping the remainder.
    pub fn take(&mut self, delta: DVec2) -> (i64, i64) {
        let (err_x, steps_x) = modf(delta.x + self.error.x);
        let (err_y, steps_y) = modf(delta.y + self.error.y);
        self.error = DVec2::new(err_x, err_y);
        (steps_x, steps_y)
    }

    pub fn error(&self) -> DVec2 {
        self.error
    }

    pub fn reset(&mut self) {
        self.error = DVec2::ZERO;
    }
}

/// `(initial_rate, delta_r)` for one LM axis.
///
/// An axis that takes no steps gets a zero delta.
pub fn axis_rate(steps: i64, initial_sps: f64, final_sps: f64) -> (i64, i64) {
    let initial_rate = (initial_sps * LM_RATE_SCALE).round();
    let final_rate = (final_sps * LM_RATE_SCALE).round();
    if steps == 0 {
        return (initial_rate as i64, 0);
    }
    let move_time = 2.0 * steps.unsigned_abs() as f64 / (initial_sps + final_sps);
    let delta_r = ((final_rate - initial_rate) / (move_time * 25_000.0)).round();
    (initial_rate as i64, delta_r as i64)
}

/// An XY move decomposed onto the two belts of the sum/difference drive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMove {
    pub steps1: i64,
    pub initial_rate1: f64,
    pub final_rate1: f64,
    pub steps2: i64,
    pub initial_rate2: f64,
    pub final_rate2: f64,
}

/// Decompose an XY step move with a scalar rate ramp into per-motor steps
/// and rates. Rates are magnitudes; direction lives in the step signs.
pub fn decompose(x_steps: i64, y_steps: i64, initial_rate: f64, final_rate: f64) -> AxisMove {
    let dir = DVec2::new(x_steps as f64, y_steps as f64).normalize_or_zero();
    let initial = dir * initial_rate;
    let final_ = dir * final_rate;
    AxisMove {
        steps1: x_steps + y_steps,
        initial_rate1: (initial.x + initial.y).abs(),
        final_rate1: (final_.x + final_.y).abs(),
        steps2: x_steps - y_steps,
        initial_rate2: (initial.x - initial.y).abs(),
        final_rate2: (final_.x - final_.y).abs(),
    }
}
