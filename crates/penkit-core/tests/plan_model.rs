use penkit_core::plan::{Block, Motion, PenMotion, Plan, PlanInstant, XyMotion};
use penkit_core::Point;
use proptest::prelude::*;

/// Build a chain of constant-velocity blocks along the X axis.
fn chain(segments: &[(f64, f64)]) -> XyMotion {
    let mut x = 0.0;
    let blocks = segments
        .iter()
        .map(|&(speed, duration)| {
            let start = Point::new(x, 0.0);
            x += speed * duration;
            Block::new(0.0, duration, speed, start, Point::new(x, 0.0)).expect("valid block")
        })
        .collect();
    XyMotion::new(blocks)
}

proptest! {
    #[test]
    fn instant_distance_is_monotonic(
        segments in prop::collection::vec((0.1f64..50.0, 0.01f64..2.0), 1..12),
        samples in prop::collection::vec(0.0f64..1.0, 2..20),
    ) {
        let motion = chain(&segments);
        let duration = motion.duration();
        let mut times: Vec<f64> = samples.iter().map(|f| f * duration).collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut last_s = -1.0;
        for t in times {
            let instant = motion.instant(t).unwrap();
            prop_assert!(instant.s >= last_s - 1e-9);
            prop_assert!(instant.s <= motion.distance() + 1e-9);
            prop_assert!(instant.v >= 0.0);
            last_s = instant.s;
        }
    }

    #[test]
    fn plan_duration_is_sum_of_motions(
        segments in prop::collection::vec((0.1f64..50.0, 0.01f64..2.0), 1..6),
        pen_durations in prop::collection::vec(0.0f64..1.0, 1..6),
    ) {
        let mut motions = vec![Motion::Xy(chain(&segments))];
        motions.extend(pen_durations.iter().map(|&d| Motion::Pen(PenMotion::new(17750, 15700, d))));
        let plan = Plan::new(motions);

        let sum: f64 = plan.motions().iter().map(Motion::duration).sum();
        prop_assert!((plan.duration() - sum).abs() < 1e-12);

        let is_pen_at_end = matches!(plan.instant(plan.duration() + 1.0), Some(PlanInstant::Pen { .. }));
        prop_assert!(is_pen_at_end);
    }
}

#[test]
fn rewritten_plan_survives_json() {
    let plan = Plan::new(vec![
        Motion::Xy(chain(&[(10.0, 1.0)])),
        Motion::Pen(PenMotion::new(17750, 15700, 0.12)),
        Motion::Xy(chain(&[(5.0, 2.0), (5.0, 1.0)])),
        Motion::Pen(PenMotion::new(15700, 28000, 0.12)),
        Motion::Xy(chain(&[(20.0, 0.5)])),
        Motion::Pen(PenMotion::new(28000, 17750, 0.12)),
    ]);

    let rewritten = plan.with_pen_heights(18000, 15000);
    let parsed = Plan::from_json(&rewritten.to_json().unwrap()).unwrap();
    assert_eq!(parsed, rewritten);

    let pens: Vec<_> = parsed
        .motions()
        .iter()
        .filter_map(Motion::as_pen)
        .map(|m| (m.initial_pos, m.final_pos))
        .collect();
    assert_eq!(pens, vec![(18000, 15000), (15000, 28000), (28000, 18000)]);
}

#[test]
fn instant_skips_empty_xy_motions() {
    let plan = Plan::new(vec![
        Motion::Xy(chain(&[(10.0, 1.0)])),
        Motion::Xy(XyMotion::new(Vec::new())),
        Motion::Pen(PenMotion::new(15700, 17750, 0.5)),
        Motion::Xy(XyMotion::new(Vec::new())),
    ]);
    assert_eq!(plan.duration(), 1.5);

    match plan.instant(0.5) {
        Some(PlanInstant::Xy { motion_index, instant }) => {
            assert_eq!(motion_index, 0);
            assert!((instant.p.x - 5.0).abs() < 1e-9);
        }
        other => panic!("expected an XY instant, got {:?}", other),
    }
    for t in [1.0, 1.2] {
        assert!(matches!(
            plan.instant(t),
            Some(PlanInstant::Pen { motion_index: 2, .. })
        ));
    }
    // past the end, the empty trailing motion defers to the pen motion
    match plan.instant(5.0) {
        Some(PlanInstant::Pen { motion_index, t, position }) => {
            assert_eq!(motion_index, 2);
            assert!((t - 1.5).abs() < 1e-9);
            assert!((position - 17750.0).abs() < 1e-9);
        }
        other => panic!("expected a pen instant, got {:?}", other),
    }

    let empty_only = Plan::new(vec![Motion::Xy(XyMotion::new(Vec::new()))]);
    assert!(empty_only.instant(0.0).is_none());
}
