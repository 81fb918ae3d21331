//! 2D geometry helpers
//!
//! Points are `glam::DVec2`, in millimetres before scaling and in device
//! steps after. A single structure never mixes the two.

use glam::DVec2;

/// A 2D point or vector
pub type Point = DVec2;

/// An ordered sequence of points
pub type Polyline = Vec<Point>;

/// Tolerance used for near-zero comparisons in planning arithmetic
pub const EPSILON: f64 = 1e-9;

/// Point `distance` along the straight line from `from` toward `to`.
///
/// Returns `from` when the two points coincide, so a zero-length
/// direction is never normalized.
pub fn point_along(from: Point, to: Point, distance: f64) -> Point {
    from + (to - from).normalize_or_zero() * distance
}

/// Cumulative length of a polyline. Paths of 0 or 1 points have length 0.
pub fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}
