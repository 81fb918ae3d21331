//! Constant-acceleration motion planning.
//!
//! Each polyline becomes one [`XyMotion`]: segments get a cornering speed
//! limit at their entry, then a left-to-right sweep assigns triangular or
//! trapezoidal velocity profiles, backtracking whenever a segment is too
//! short to slow down for the next corner.

use penkit_core::geometry::point_along;
use penkit_core::{Block, Motion, PenMotion, Plan, PlanError, Point, Polyline, XyMotion, EPSILON};

use crate::optimization::dedup_points;
use crate::profile::{AccelerationProfile, ToolingProfile};

/// A straight piece of a polyline being planned.
#[derive(Debug, Clone)]
struct Segment {
    p1: Point,
    p2: Point,
    max_entry_velocity: f64,
    entry_velocity: f64,
    blocks: Vec<Block>,
}

impl Segment {
    fn new(p1: Point, p2: Point) -> Self {
        Self {
            p1,
            p2,
            max_entry_velocity: 0.0,
            entry_velocity: 0.0,
            blocks: Vec::new(),
        }
    }

    fn length(&self) -> f64 {
        self.p1.distance(self.p2)
    }

    fn direction(&self) -> Point {
        (self.p2 - self.p1).normalize_or_zero()
    }
}

/// Accelerate-then-decelerate profile over a segment.
struct Triangle {
    s1: f64,
    s2: f64,
    t1: f64,
    t2: f64,
    v_max: f64,
    p2: Point,
}

/// Accelerate, cruise, decelerate.
struct Trapezoid {
    t1: f64,
    t2: f64,
    t3: f64,
    p2: Point,
    p3: Point,
}

/// Highest speed at which the tool can pass from `seg1` into `seg2`
/// without exceeding the lateral acceleration bound.
fn corner_velocity(seg1: &Segment, seg2: &Segment, profile: &AccelerationProfile) -> f64 {
    let cosine = -seg1.direction().dot(seg2.direction());
    if (cosine - 1.0).abs() < EPSILON {
        // doubling back on itself
        return 0.0;
    }
    let sine = ((1.0 - cosine) / 2.0).sqrt();
    if (sine - 1.0).abs() < EPSILON {
        return profile.maximum_velocity;
    }
    let v = (profile.acceleration * profile.cornering_factor * sine / (1.0 - sine)).sqrt();
    v.min(profile.maximum_velocity)
}

fn compute_triangle(
    distance: f64,
    initial_vel: f64,
    final_vel: f64,
    accel: f64,
    p1: Point,
    p3: Point,
) -> Triangle {
    let s1 = (2.0 * accel * distance + final_vel * final_vel - initial_vel * initial_vel)
        / (4.0 * accel);
    let s2 = distance - s1;
    let v_max = (initial_vel * initial_vel + 2.0 * accel * s1).sqrt();
    Triangle {
        s1,
        s2,
        t1: (v_max - initial_vel) / accel,
        t2: (final_vel - v_max) / -accel,
        v_max,
        p2: point_along(p1, p3, s1),
    }
}

fn compute_trapezoid(
    distance: f64,
    initial_vel: f64,
    max_vel: f64,
    final_vel: f64,
    accel: f64,
    p1: Point,
    p4: Point,
) -> Trapezoid {
    let t1 = (max_vel - initial_vel) / accel;
    let s1 = (max_vel + initial_vel) / 2.0 * t1;
    let t3 = (final_vel - max_vel) / -accel;
    let s3 = (final_vel + max_vel) / 2.0 * t3;
    let s2 = distance - s1 - s3;
    Trapezoid {
        t1,
        t2: s2 / max_vel,
        t3,
        p2: point_along(p1, p4, s1),
        p3: point_along(p1, p4, distance - s3),
    }
}

/// Plan a single pen-down or pen-up traversal through `points`.
///
/// Consecutive points closer than [`EPSILON`] are merged first. A path
/// that collapses to one point yields a single zero-duration block there;
/// an empty path yields a motion with no blocks.
pub fn constant_acceleration_plan(
    points: &[Point],
    profile: &AccelerationProfile,
) -> Result<XyMotion, PlanError> {
    profile.validate()?;

    let points = dedup_points(points, EPSILON);
    match points.as_slice() {
        [] => return Ok(XyMotion::new(Vec::new())),
        [only] => return Ok(XyMotion::new(vec![Block::stationary(*only)])),
        _ => {}
    }

    let mut segments: Vec<Segment> = points
        .windows(2)
        .map(|w| Segment::new(w[0], w[1]))
        .collect();

    for i in 1..segments.len() {
        segments[i].max_entry_velocity =
            corner_velocity(&segments[i - 1], &segments[i], profile);
    }

    // Zero-length terminal segment forces the exit velocity to zero.
    if let Some(&last) = points.last() {
        segments.push(Segment::new(last, last));
    }

    let accel = profile.acceleration;
    let v_max = profile.maximum_velocity;

    let mut i = 0;
    while i + 1 < segments.len() {
        let distance = segments[i].length();
        let v_initial = segments[i].entry_velocity;
        let v_exit = segments[i + 1].max_entry_velocity;
        let (p1, p2) = (segments[i].p1, segments[i].p2);

        let m = compute_triangle(distance, v_initial, v_exit, accel, p1, p2);

        if m.s1 < -EPSILON && i > 0 {
            // Even braking from the very start of this segment would
            // overshoot v_exit: enter slower and replan the previous one.
            segments[i].max_entry_velocity = (v_exit * v_exit + 2.0 * accel * distance).sqrt();
            i -= 1;
        } else if m.s2 <= 0.0 {
            // No room to decelerate, accelerate the whole way.
            let v_final = (v_initial * v_initial + 2.0 * accel * distance).sqrt();
            let t = (v_final - v_initial) / accel;
            segments[i].blocks = vec![Block::new(accel, t, v_initial, p1, p2)?];
            segments[i + 1].entry_velocity = v_final;
            i += 1;
        } else if m.v_max > v_max {
            let z = compute_trapezoid(distance, v_initial, v_max, v_exit, accel, p1, p2);
            segments[i].blocks = vec![
                Block::new(accel, z.t1, v_initial, p1, z.p2)?,
                Block::new(0.0, z.t2, v_max, z.p2, z.p3)?,
                Block::new(-accel, z.t3, v_max, z.p3, p2)?,
            ];
            segments[i + 1].entry_velocity = v_exit;
            i += 1;
        } else {
            segments[i].blocks = vec![
                Block::new(accel, m.t1, v_initial, p1, m.p2)?,
                Block::new(-accel, m.t2, m.v_max, m.p2, p2)?,
            ];
            segments[i + 1].entry_velocity = v_exit;
            i += 1;
        }
    }

    let blocks = segments
        .into_iter()
        .flat_map(|s| s.blocks)
        .filter(|b| b.duration() > EPSILON)
        .collect();
    Ok(XyMotion::new(blocks))
}

/// Plan a whole drawing: travel to each path, drop the pen, draw, lift.
///
/// The final lift goes to the home pen position, then the tool returns to
/// the origin and the pen is brought from home back to pen-up height.
/// Empty paths are skipped.
pub fn plan(paths: &[Polyline], tooling: &ToolingProfile) -> Result<Plan, PlanError> {
    let drawable: Vec<&Polyline> = paths.iter().filter(|p| !p.is_empty()).collect();
    let mut motions = Vec::with_capacity(drawable.len() * 4 + 2);
    let mut current = Point::ZERO;

    for (i, path) in drawable.iter().enumerate() {
        let draw = constant_acceleration_plan(path, &tooling.pen_down)?;
        let start = draw.p1().unwrap_or(path[0]);
        let end = draw.p2().unwrap_or(path[path.len() - 1]);
        let lift_to = if i + 1 == drawable.len() {
            tooling.pen_home_pos
        } else {
            tooling.pen_up_pos
        };

        motions.push(Motion::Xy(constant_acceleration_plan(
            &[current, start],
            &tooling.pen_up,
        )?));
        motions.push(Motion::Pen(PenMotion::new(
            tooling.pen_up_pos,
            tooling.pen_down_pos,
            tooling.pen_drop_duration,
        )));
        motions.push(Motion::Xy(draw));
        motions.push(Motion::Pen(PenMotion::new(
            tooling.pen_down_pos,
            lift_to,
            tooling.pen_lift_duration,
        )));
        current = end;
    }

    motions.push(Motion::Xy(constant_acceleration_plan(
        &[current, Point::ZERO],
        &tooling.pen_up,
    )?));
    motions.push(Motion::Pen(PenMotion::new(
        tooling.pen_home_pos,
        tooling.pen_up_pos,
        tooling.pen_drop_duration,
    )));

    Ok(Plan::new(motions))
}
