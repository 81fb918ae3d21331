//! From millimetre paths to a step-unit plan.

use std::time::Instant;

use penkit_core::{Plan, PlanError, Polyline};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::optimization::{dedup_points, elide_short_paths, join_nearby, optimize};
use crate::planning::plan;
use crate::profile::{AccelerationProfile, MachineProfile, ToolingProfile};

/// User-facing planning options, in millimetres, seconds and percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    /// Pen height for travel, percent.
    pub pen_up_height: f64,
    /// Pen height for drawing, percent.
    pub pen_down_height: f64,
    /// Merge points closer than this within a path. 0 disables.
    pub point_join_radius: f64,
    /// Join paths whose ends are closer than this. 0 disables.
    pub path_join_radius: f64,
    pub pen_down_acceleration: f64,
    pub pen_down_max_velocity: f64,
    pub pen_down_cornering_factor: f64,
    pub pen_up_acceleration: f64,
    pub pen_up_max_velocity: f64,
    /// Seconds.
    pub pen_drop_duration: f64,
    /// Seconds.
    pub pen_lift_duration: f64,
    /// Reorder paths to reduce pen-up travel.
    pub sort_paths: bool,
    /// Drop paths shorter than this. 0 disables.
    pub minimum_path_length: f64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            pen_up_height: 50.0,
            pen_down_height: 60.0,
            point_join_radius: 0.0,
            path_join_radius: 0.5,
            pen_down_acceleration: 200.0,
            pen_down_max_velocity: 50.0,
            pen_down_cornering_factor: 0.127,
            pen_up_acceleration: 400.0,
            pen_up_max_velocity: 200.0,
            pen_drop_duration: 0.12,
            pen_lift_duration: 0.12,
            sort_paths: true,
            minimum_path_length: 0.0,
        }
    }
}

impl PlanOptions {
    /// Pen-down limits in millimetre units.
    pub fn pen_down_profile(&self) -> AccelerationProfile {
        AccelerationProfile::new(
            self.pen_down_acceleration,
            self.pen_down_max_velocity,
            self.pen_down_cornering_factor,
        )
    }

    /// Pen-up limits in millimetre units. Travel never slows for corners.
    pub fn pen_up_profile(&self) -> AccelerationProfile {
        AccelerationProfile::new(self.pen_up_acceleration, self.pen_up_max_velocity, 0.0)
    }

    /// Tooling for planning in device steps on `machine`.
    pub fn tooling(&self, machine: &MachineProfile) -> ToolingProfile {
        ToolingProfile {
            pen_down: self.pen_down_profile().scaled(machine.steps_per_mm),
            pen_up: self.pen_up_profile().scaled(machine.steps_per_mm),
            pen_up_pos: machine.pen_pct_to_pos(self.pen_up_height),
            pen_down_pos: machine.pen_pct_to_pos(self.pen_down_height),
            pen_home_pos: machine.pen_home_pos(),
            pen_drop_duration: self.pen_drop_duration,
            pen_lift_duration: self.pen_lift_duration,
        }
    }

    /// Validate option values
    pub fn validate(&self) -> Result<(), PlanError> {
        self.pen_down_profile().validate()?;
        self.pen_up_profile().validate()?;
        let non_negative = [
            ("point_join_radius", self.point_join_radius),
            ("path_join_radius", self.path_join_radius),
            ("pen_drop_duration", self.pen_drop_duration),
            ("pen_lift_duration", self.pen_lift_duration),
            ("minimum_path_length", self.minimum_path_length),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(PlanError::InvalidProfile {
                    reason: format!("{} must be >= 0, but was {}", name, value),
                });
            }
        }
        Ok(())
    }
}

/// Run the whole preparation pipeline on millimetre `paths`.
///
/// Order: point dedup, sorting, short-path elision, nearby-path joining,
/// scaling to steps, then motion planning. Each stage is skipped when its
/// option disables it.
pub fn replan(
    paths: &[Polyline],
    options: &PlanOptions,
    machine: &MachineProfile,
) -> Result<Plan, PlanError> {
    options.validate()?;
    let mut paths: Vec<Polyline> = paths.to_vec();

    if options.point_join_radius > 0.0 {
        paths = paths
            .iter()
            .map(|p| dedup_points(p, options.point_join_radius))
            .collect();
    }

    if options.sort_paths {
        let started = Instant::now();
        paths = optimize(&paths);
        debug!("Sorted {} paths in {:?}", paths.len(), started.elapsed());
    }

    if options.minimum_path_length > 0.0 {
        let before = paths.len();
        paths = elide_short_paths(&paths, options.minimum_path_length);
        debug!("Elided {} short paths", before - paths.len());
    }

    if options.path_join_radius > 0.0 {
        let before = paths.len();
        paths = join_nearby(&paths, options.path_join_radius);
        debug!("Joined {} paths into {}", before, paths.len());
    }

    let steps_per_mm = machine.steps_per_mm;
    for path in &mut paths {
        for p in path.iter_mut() {
            *p *= steps_per_mm;
        }
    }

    let started = Instant::now();
    let planned = plan(&paths, &options.tooling(machine))?;
    debug!(
        "Planned {} motions ({:.1}s) in {:?}",
        planned.len(),
        planned.duration(),
        started.elapsed()
    );
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use penkit_core::{Motion, Point};

    #[test]
    fn test_defaults() {
        let options = PlanOptions::default();
        assert!(options.validate().is_ok());
        let tooling = options.tooling(&MachineProfile::AXIDRAW);
        assert_eq!(tooling.pen_up_pos, 17750);
        assert_eq!(tooling.pen_down_pos, 15700);
        assert_eq!(tooling.pen_home_pos, 28000);
        assert_eq!(tooling.pen_down.acceleration, 1000.0);
        assert_eq!(tooling.pen_up.maximum_velocity, 1000.0);
        assert_eq!(tooling.pen_up.cornering_factor, 0.0);
    }

    #[test]
    fn test_validate_rejects_negative() {
        let options = PlanOptions {
            path_join_radius: -1.0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_replan_scales_to_steps() {
        let paths = vec![vec![Point::new(10.0, 0.0), Point::new(20.0, 0.0)]];
        let plan = replan(&paths, &PlanOptions::default(), &MachineProfile::AXIDRAW).unwrap();
        let draw = plan.motion(2).and_then(Motion::as_xy).unwrap();
        assert_eq!(draw.p1(), Some(Point::new(50.0, 0.0)));
        assert_eq!(draw.p2(), Some(Point::new(100.0, 0.0)));
    }

    #[test]
    fn test_replan_joins_after_sorting() {
        // sorting puts the reversed third path next, which then joins
        let paths = vec![
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            vec![Point::new(100.0, 100.0), Point::new(110.0, 100.0)],
            vec![Point::new(20.0, 0.0), Point::new(10.0, 0.0)],
        ];
        let plan = replan(&paths, &PlanOptions::default(), &MachineProfile::AXIDRAW).unwrap();
        // two drawing paths remain: 4 motions each plus return and final pen
        assert_eq!(plan.len(), 10);
    }
}
