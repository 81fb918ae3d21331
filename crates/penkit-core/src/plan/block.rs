//! Constant-acceleration motion blocks.

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::geometry::{point_along, Point, EPSILON};

/// Kinematic state sampled at one moment of a motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instant {
    /// Absolute time within the owning motion, seconds.
    pub t: f64,
    /// Tool position.
    pub p: Point,
    /// Distance travelled since the start of the owning motion.
    pub s: f64,
    /// Speed along the path.
    pub v: f64,
    /// Acceleration along the path.
    pub a: f64,
}

/// One constant-acceleration straight-line segment.
///
/// The distance is derived from the endpoints when the block is built and
/// is never stored independently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    accel: f64,
    duration: f64,
    v_initial: f64,
    p1: Point,
    p2: Point,
    distance: f64,
}

impl Block {
    /// Build a block, rejecting negative initial velocity and a final
    /// velocity meaningfully below zero.
    pub fn new(
        accel: f64,
        duration: f64,
        v_initial: f64,
        p1: Point,
        p2: Point,
    ) -> Result<Self, PlanError> {
        if !(v_initial >= 0.0) {
            return Err(PlanError::InvalidBlock {
                reason: format!("vInitial must be >= 0, but was {}", v_initial),
            });
        }
        if !(v_initial + accel * duration >= -EPSILON) {
            return Err(PlanError::InvalidBlock {
                reason: format!(
                    "vFinal must be >= 0, but vInitial={}, duration={}, accel={}",
                    v_initial, duration, accel
                ),
            });
        }
        Ok(Self {
            accel,
            duration,
            v_initial,
            p1,
            p2,
            distance: p1.distance(p2),
        })
    }

    /// A zero-length, zero-duration block resting at `p`.
    pub fn stationary(p: Point) -> Self {
        Self {
            accel: 0.0,
            duration: 0.0,
            v_initial: 0.0,
            p1: p,
            p2: p,
            distance: 0.0,
        }
    }

    pub fn accel(&self) -> f64 {
        self.accel
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn v_initial(&self) -> f64 {
        self.v_initial
    }

    pub fn p1(&self) -> Point {
        self.p1
    }

    pub fn p2(&self) -> Point {
        self.p2
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Exit velocity, clamped at zero to absorb rounding.
    pub fn v_final(&self) -> f64 {
        (self.v_initial + self.accel * self.duration).max(0.0)
    }

    /// Sample the block `t` seconds after it starts.
    ///
    /// `dt` and `ds` are the time and distance offsets of the block within
    /// its motion and are added to the result.
    pub fn instant(&self, t: f64, dt: f64, ds: f64) -> Instant {
        let t = t.min(self.duration).max(0.0);
        let a = self.accel;
        let v = self.v_initial + a * t;
        let s = (self.v_initial * t + a * t * t / 2.0)
            .min(self.distance)
            .max(0.0);
        Instant {
            t: t + dt,
            p: point_along(self.p1, self.p2, s),
            s: s + ds,
            v,
            a,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative_initial_velocity() {
        let err = Block::new(1.0, 1.0, -0.5, Point::ZERO, Point::X).unwrap_err();
        assert!(matches!(err, PlanError::InvalidBlock { .. }));
        assert!(Block::new(1.0, 1.0, f64::NAN, Point::ZERO, Point::X).is_err());
    }

    #[test]
    fn test_rejects_negative_final_velocity() {
        assert!(Block::new(-10.0, 1.0, 5.0, Point::ZERO, Point::X).is_err());
        // within tolerance
        let b = Block::new(-10.0, 0.5, 5.0 - 1e-12, Point::ZERO, Point::X).unwrap();
        assert_eq!(b.v_final(), 0.0);
    }

    #[test]
    fn test_instant_clamps() {
        let b = Block::new(2.0, 2.0, 0.0, Point::ZERO, Point::new(4.0, 0.0)).unwrap();
        assert_eq!(b.distance(), 4.0);

        let mid = b.instant(1.0, 10.0, 100.0);
        assert_eq!(mid.t, 11.0);
        assert_eq!(mid.s, 101.0);
        assert_eq!(mid.v, 2.0);
        assert_eq!(mid.p, Point::new(1.0, 0.0));

        let past = b.instant(5.0, 0.0, 0.0);
        assert_eq!(past.t, 2.0);
        assert_eq!(past.p, Point::new(4.0, 0.0));

        let before = b.instant(-1.0, 0.0, 0.0);
        assert_eq!(before.p, Point::ZERO);
    }
}
