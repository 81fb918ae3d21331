//! XY and pen motions.

use super::block::{Block, Instant};
use crate::geometry::Point;

/// A continuous pen-up or pen-down traversal made of consecutive blocks.
///
/// Cumulative start times and start distances are precomputed so that
/// [`XyMotion::instant`] is a binary search.
#[derive(Debug, Clone, PartialEq)]
pub struct XyMotion {
    blocks: Vec<Block>,
    ts: Vec<f64>,
    ss: Vec<f64>,
}

impl XyMotion {
    pub fn new(blocks: Vec<Block>) -> Self {
        let mut ts = Vec::with_capacity(blocks.len());
        let mut ss = Vec::with_capacity(blocks.len());
        let (mut t, mut s) = (0.0, 0.0);
        for block in &blocks {
            ts.push(t);
            ss.push(s);
            t += block.duration();
            s += block.distance();
        }
        Self { blocks, ts, ss }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Start point, or `None` for a motion without blocks.
    pub fn p1(&self) -> Option<Point> {
        self.blocks.first().map(Block::p1)
    }

    /// End point, or `None` for a motion without blocks.
    pub fn p2(&self) -> Option<Point> {
        self.blocks.last().map(Block::p2)
    }

    pub fn duration(&self) -> f64 {
        self.blocks.iter().map(Block::duration).sum()
    }

    /// Total path length travelled.
    pub fn distance(&self) -> f64 {
        self.blocks.iter().map(Block::distance).sum()
    }

    /// Kinematic state at time `t`, clamped into `[0, duration]`.
    pub fn instant(&self, t: f64) -> Option<Instant> {
        if self.blocks.is_empty() {
            return None;
        }
        let t = t.min(self.duration()).max(0.0);
        let idx = self.ts.partition_point(|&start| start < t);
        let block_idx = if self.ts.get(idx) == Some(&t) {
            idx
        } else {
            idx.saturating_sub(1)
        };
        let block = &self.blocks[block_idx];
        Some(block.instant(t - self.ts[block_idx], self.ts[block_idx], self.ss[block_idx]))
    }
}

/// A servo move between two pen heights.
///
/// Heights are in the servo's 83 ns PWM units; larger values hold the pen
/// higher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenMotion {
    pub initial_pos: i32,
    pub final_pos: i32,
    /// Seconds.
    pub duration: f64,
}

impl PenMotion {
    pub fn new(initial_pos: i32, final_pos: i32, duration: f64) -> Self {
        Self {
            initial_pos,
            final_pos,
            duration,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// True when this motion leaves the pen higher than it found it.
    pub fn raises_pen(&self) -> bool {
        self.initial_pos < self.final_pos
    }

    /// Interpolated servo position `t` seconds into the motion.
    pub fn position_at(&self, t: f64) -> f64 {
        let initial = f64::from(self.initial_pos);
        let final_pos = f64::from(self.final_pos);
        if self.duration <= 0.0 {
            return final_pos;
        }
        let frac = (t / self.duration).clamp(0.0, 1.0);
        initial + (final_pos - initial) * frac
    }
}

/// One step of a plan: either an XY traversal or a pen servo move.
#[derive(Debug, Clone, PartialEq)]
pub enum Motion {
    Xy(XyMotion),
    Pen(PenMotion),
}

impl Motion {
    pub fn duration(&self) -> f64 {
        match self {
            Motion::Xy(m) => m.duration(),
            Motion::Pen(m) => m.duration(),
        }
    }

    pub fn as_xy(&self) -> Option<&XyMotion> {
        match self {
            Motion::Xy(m) => Some(m),
            Motion::Pen(_) => None,
        }
    }

    pub fn as_pen(&self) -> Option<&PenMotion> {
        match self {
            Motion::Xy(_) => None,
            Motion::Pen(m) => Some(m),
        }
    }
}

impl From<XyMotion> for Motion {
    fn from(m: XyMotion) -> Self {
        Motion::Xy(m)
    }
}

impl From<PenMotion> for Motion {
    fn from(m: PenMotion) -> Self {
        Motion::Pen(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> XyMotion {
        let a = Block::new(1.0, 2.0, 0.0, Point::ZERO, Point::new(2.0, 0.0)).unwrap();
        let b = Block::new(0.0, 1.0, 2.0, Point::new(2.0, 0.0), Point::new(4.0, 0.0)).unwrap();
        let c = Block::new(-1.0, 2.0, 2.0, Point::new(4.0, 0.0), Point::new(6.0, 0.0)).unwrap();
        XyMotion::new(vec![a, b, c])
    }

    #[test]
    fn test_xy_motion_totals() {
        let m = line();
        assert_eq!(m.duration(), 5.0);
        assert_eq!(m.distance(), 6.0);
        assert_eq!(m.p1(), Some(Point::ZERO));
        assert_eq!(m.p2(), Some(Point::new(6.0, 0.0)));
    }

    #[test]
    fn test_xy_motion_instant_lookup() {
        let m = line();

        let start = m.instant(0.0).unwrap();
        assert_eq!(start.p, Point::ZERO);
        assert_eq!(start.v, 0.0);

        // exactly on a block boundary selects the block starting there
        let boundary = m.instant(2.0).unwrap();
        assert_eq!(boundary.a, 0.0);
        assert_eq!(boundary.p, Point::new(2.0, 0.0));

        let cruise = m.instant(2.5).unwrap();
        assert!((cruise.p.x - 3.0).abs() < 1e-12);
        assert!((cruise.s - 3.0).abs() < 1e-12);

        let end = m.instant(99.0).unwrap();
        assert_eq!(end.t, 5.0);
        assert!((end.p.x - 6.0).abs() < 1e-12);
        assert!(end.v.abs() < 1e-12);
    }

    #[test]
    fn test_empty_motion_has_no_instant() {
        let m = XyMotion::new(Vec::new());
        assert_eq!(m.duration(), 0.0);
        assert!(m.instant(0.0).is_none());
        assert!(m.p1().is_none());
    }

    #[test]
    fn test_pen_motion() {
        let lift = PenMotion::new(12000, 16000, 0.5);
        assert!(lift.raises_pen());
        let drop = PenMotion::new(16000, 12000, 0.5);
        assert!(!drop.raises_pen());
        assert_eq!(drop.position_at(0.25), 14000.0);
        assert_eq!(drop.position_at(10.0), 12000.0);
        assert_eq!(Motion::from(drop).duration(), 0.5);
    }
}
