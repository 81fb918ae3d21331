//! Path ordering, filtering and merging.
//!
//! These run on millimetre paths before motion planning and only ever
//! reorder, reverse, drop or concatenate input paths.

use penkit_core::geometry::polyline_length;
use penkit_core::{Point, Polyline};

/// Cumulative length of a path. Paths of 0 or 1 points have length 0.
pub fn path_length(path: &[Point]) -> f64 {
    polyline_length(path)
}

/// Drop every point within `radius` of the previously kept point.
///
/// The first point is always kept. A radius of 0 returns the path as is.
pub fn dedup_points(path: &[Point], radius: f64) -> Polyline {
    if radius == 0.0 {
        return path.to_vec();
    }
    let mut kept: Polyline = Vec::with_capacity(path.len());
    for &p in path {
        match kept.last() {
            Some(&last) if p.distance(last) <= radius => {}
            _ => kept.push(p),
        }
    }
    kept
}

/// Join each path onto the previous one when the previous path ends within
/// `tolerance` of where it begins.
///
/// Leading points of the joined path that lie within `tolerance` of the
/// join point are dropped. Paths are processed in input order. A tolerance
/// of 0 or less joins nothing.
pub fn join_nearby(paths: &[Polyline], tolerance: f64) -> Vec<Polyline> {
    if !(tolerance > 0.0) {
        return paths.to_vec();
    }
    let tol2 = tolerance * tolerance;
    let mut joined: Vec<Polyline> = Vec::with_capacity(paths.len());
    for path in paths {
        let join_point = joined.last().and_then(|prev| prev.last().copied());
        match (join_point, path.first()) {
            (Some(end), Some(&start)) if end.distance_squared(start) <= tol2 => {
                if let Some(prev) = joined.last_mut() {
                    prev.extend(
                        path.iter()
                            .skip_while(|p| end.distance_squared(**p) <= tol2)
                            .copied(),
                    );
                }
            }
            _ => joined.push(path.clone()),
        }
    }
    joined
}

/// Keep only paths at least `minimum_length` long.
pub fn elide_short_paths(paths: &[Polyline], minimum_length: f64) -> Vec<Polyline> {
    paths
        .iter()
        .filter(|p| path_length(p) >= minimum_length)
        .cloned()
        .collect()
}

/// Greedy nearest-neighbour reordering to reduce pen-up travel.
///
/// Starts with path 0 as given, then repeatedly picks, over both
/// orientations of every unvisited path, the start point closest to the
/// current trailing point. Ties go to the lowest index, forward before
/// reversed. Paths chosen in reverse are emitted reversed.
pub fn optimize(paths: &[Polyline]) -> Vec<Polyline> {
    if paths.is_empty() {
        return Vec::new();
    }

    let mut visited = vec![false; paths.len()];
    let mut sorted = Vec::with_capacity(paths.len());

    visited[0] = true;
    sorted.push(paths[0].clone());
    let mut trailing = paths[0].last().copied();

    for _ in 1..paths.len() {
        let mut best: Option<(usize, bool, f64)> = None;
        for (i, path) in paths.iter().enumerate() {
            if visited[i] {
                continue;
            }
            for reversed in [false, true] {
                let start = if reversed { path.last() } else { path.first() };
                let d = match (trailing, start) {
                    (Some(a), Some(&b)) => a.distance_squared(b),
                    _ => 0.0,
                };
                if best.map_or(true, |(_, _, min)| d < min) {
                    best = Some((i, reversed, d));
                }
            }
        }

        let Some((i, reversed, _)) = best else {
            break;
        };
        visited[i] = true;
        let mut next = paths[i].clone();
        if reversed {
            next.reverse();
        }
        if let Some(&end) = next.last() {
            trailing = Some(end);
        }
        sorted.push(next);
    }

    sorted
}
