use penkit_core::{Motion, Point, Polyline};
use penkit_planner::{
    constant_acceleration_plan, elide_short_paths, join_nearby, optimize, plan, replan,
    AccelerationProfile, MachineProfile, PlanOptions,
};
use proptest::prelude::*;

fn point() -> impl Strategy<Value = Point> {
    (-200.0f64..200.0, -200.0f64..200.0).prop_map(|(x, y)| Point::new(x, y))
}

fn polyline() -> impl Strategy<Value = Polyline> {
    prop::collection::vec(point(), 0..12)
}

fn profile() -> impl Strategy<Value = AccelerationProfile> {
    (10.0f64..2000.0, 5.0f64..500.0, 0.0f64..2.0)
        .prop_map(|(a, v, c)| AccelerationProfile::new(a, v, c))
}

fn sort_key(path: &Polyline) -> Vec<(u64, u64)> {
    let mut key: Vec<(u64, u64)> = path.iter().map(|p| (p.x.to_bits(), p.y.to_bits())).collect();
    let mut reversed = key.clone();
    reversed.reverse();
    if reversed < key {
        key = reversed;
    }
    key
}

proptest! {
    #[test]
    fn velocities_never_negative(points in polyline(), profile in profile()) {
        let motion = constant_acceleration_plan(&points, &profile).unwrap();
        for block in motion.blocks() {
            prop_assert!(block.v_initial() >= 0.0);
            prop_assert!(block.v_initial() + block.accel() * block.duration() >= -1e-9);
        }
    }

    #[test]
    fn velocity_is_continuous_across_blocks(points in polyline(), profile in profile()) {
        let motion = constant_acceleration_plan(&points, &profile).unwrap();
        for pair in motion.blocks().windows(2) {
            let tolerance = 1e-6 * profile.maximum_velocity.max(1.0);
            prop_assert!((pair[0].v_final() - pair[1].v_initial()).abs() < tolerance);
        }
    }

    #[test]
    fn planned_distance_matches_path(points in polyline(), profile in profile()) {
        let motion = constant_acceleration_plan(&points, &profile).unwrap();
        let expected = penkit_planner::path_length(&points);
        prop_assert!((motion.distance() - expected).abs() < 1e-5 * expected.max(1.0));
    }

    #[test]
    fn instants_stay_on_motion(points in polyline(), profile in profile(), frac in 0.0f64..=1.0) {
        let motion = constant_acceleration_plan(&points, &profile).unwrap();
        if let Some(instant) = motion.instant(frac * motion.duration()) {
            prop_assert!(instant.s >= -1e-9);
            prop_assert!(instant.s <= motion.distance() + 1e-6);
            prop_assert!(instant.v >= -1e-6);
        }
    }

    #[test]
    fn optimize_preserves_paths(paths in prop::collection::vec(polyline(), 0..10)) {
        let sorted = optimize(&paths);
        let mut before: Vec<_> = paths.iter().map(sort_key).collect();
        let mut after: Vec<_> = sorted.iter().map(sort_key).collect();
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn optimize_picks_nearest_next(paths in prop::collection::vec(prop::collection::vec(point(), 1..5), 2..8)) {
        let sorted = optimize(&paths);
        for i in 1..sorted.len() {
            let from = *sorted[i - 1].last().unwrap();
            let chosen = from.distance_squared(sorted[i][0]);
            for later in &sorted[i + 1..] {
                prop_assert!(chosen <= from.distance_squared(later[0]));
                prop_assert!(chosen <= from.distance_squared(*later.last().unwrap()));
            }
        }
    }

    #[test]
    fn zero_tolerances_are_identity(paths in prop::collection::vec(polyline(), 0..8)) {
        prop_assert_eq!(join_nearby(&paths, 0.0), paths.clone());
        prop_assert_eq!(elide_short_paths(&paths, 0.0), paths);
    }

    #[test]
    fn replanned_plan_round_trips(paths in prop::collection::vec(polyline(), 0..5)) {
        let planned = replan(&paths, &PlanOptions::default(), &MachineProfile::AXIDRAW).unwrap();
        let parsed = penkit_core::Plan::from_json(&planned.to_json().unwrap()).unwrap();
        prop_assert_eq!(parsed.len(), planned.len());
        prop_assert!((parsed.duration() - planned.duration()).abs() < 1e-9);
    }
}

#[test]
fn pen_motions_alternate_and_end_home() {
    let options = PlanOptions::default();
    let machine = MachineProfile::AXIDRAW;
    let tooling = options.tooling(&machine);
    let paths = vec![
        vec![Point::new(0.0, 0.0), Point::new(50.0, 0.0)],
        vec![Point::new(50.0, 50.0), Point::new(0.0, 50.0)],
        vec![Point::new(0.0, 100.0), Point::new(50.0, 100.0)],
    ];
    let planned = plan(&paths, &tooling).unwrap();

    let pens: Vec<_> = planned.motions().iter().filter_map(Motion::as_pen).collect();
    assert_eq!(pens.len(), 7);
    assert_eq!(pens[5].final_pos, machine.pen_home_pos());
    assert_eq!(pens[6].initial_pos, machine.pen_home_pos());
    assert_eq!(pens[6].final_pos, tooling.pen_up_pos);

    let retargeted = planned.with_pen_heights(tooling.pen_up_pos, tooling.pen_down_pos);
    assert_eq!(retargeted, planned);
}
