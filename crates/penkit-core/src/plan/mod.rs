//! # Plan Model
//!
//! A plan is an ordered list of motions produced once by the planner. It
//! carries no device state: only geometry and time. The one permitted
//! rewrite is [`Plan::with_pen_heights`], which retargets the servo
//! endpoints without replanning.

mod block;
mod motion;
mod serialization;

pub use block::{Block, Instant};
pub use motion::{Motion, PenMotion, XyMotion};

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// State of a plan at one moment in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlanInstant {
    /// The tool is travelling in XY.
    Xy {
        /// Index of the active motion.
        motion_index: usize,
        /// Kinematic state, `t` measured from the start of the plan.
        instant: Instant,
    },
    /// The pen servo is moving.
    Pen {
        /// Index of the active motion.
        motion_index: usize,
        /// Time from the start of the plan.
        t: f64,
        /// Interpolated servo position.
        position: f64,
    },
}

/// An ordered sequence of XY and pen motions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    motions: Vec<Motion>,
}

impl Plan {
    pub fn new(motions: Vec<Motion>) -> Self {
        Self { motions }
    }

    pub fn motions(&self) -> &[Motion] {
        &self.motions
    }

    pub fn motion(&self, i: usize) -> Option<&Motion> {
        self.motions.get(i)
    }

    pub fn len(&self) -> usize {
        self.motions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motions.is_empty()
    }

    /// Total duration in seconds.
    pub fn duration(&self) -> f64 {
        self.motions.iter().map(Motion::duration).sum()
    }

    /// The first pen motion, whose initial height is where the pen should
    /// be parked before plotting starts.
    pub fn first_pen_motion(&self) -> Option<&PenMotion> {
        self.motions.iter().find_map(Motion::as_pen)
    }

    /// State of the plan at time `t` seconds from its start.
    ///
    /// Times past the end report the end of the last motion. XY motions
    /// without blocks take no time and are skipped.
    pub fn instant(&self, t: f64) -> Option<PlanInstant> {
        let mut start = 0.0;
        let mut last = None;
        for (i, motion) in self.motions.iter().enumerate() {
            let duration = motion.duration();
            if !motion_is_empty(motion) {
                if t < start + duration {
                    return motion_instant(i, motion, start, t - start);
                }
                last = Some((i, motion, start));
            }
            start += duration;
        }
        let (i, motion, start) = last?;
        motion_instant(i, motion, start, t - start)
    }

    /// Copy of this plan with every pen motion retargeted to new heights.
    ///
    /// The last two pen motions are the boundary motions: the final lift
    /// into the home position and the closing move from home to pen-up.
    /// Their home height is preserved. Every other pen motion alternates
    /// drop (`up -> down`) and lift (`down -> up`). XY motions are
    /// untouched.
    pub fn with_pen_heights(&self, pen_up: i32, pen_down: i32) -> Plan {
        let pen_indices: Vec<usize> = self
            .motions
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.as_pen().map(|_| i))
            .collect();
        let last = pen_indices.last().copied();
        let before_last = pen_indices
            .len()
            .checked_sub(2)
            .and_then(|i| pen_indices.get(i))
            .copied();
        let home = last
            .and_then(|i| self.motions[i].as_pen())
            .map(|m| m.initial_pos);

        let mut alternating = 0usize;
        let motions = self
            .motions
            .iter()
            .enumerate()
            .map(|(j, motion)| match motion {
                Motion::Xy(_) => motion.clone(),
                Motion::Pen(pen) => {
                    let home = home.unwrap_or(pen.initial_pos);
                    let (initial, final_pos) = if Some(j) == before_last {
                        (pen_down, home)
                    } else if Some(j) == last {
                        (home, pen_up)
                    } else {
                        let pair = if alternating % 2 == 0 {
                            (pen_up, pen_down)
                        } else {
                            (pen_down, pen_up)
                        };
                        alternating += 1;
                        pair
                    };
                    Motion::Pen(PenMotion::new(initial, final_pos, pen.duration()))
                }
            })
            .collect();
        Plan::new(motions)
    }

    /// Serialize to the JSON plan document.
    pub fn to_json(&self) -> Result<String, PlanError> {
        serde_json::to_string(self).map_err(|e| PlanError::Serialization {
            reason: e.to_string(),
        })
    }

    /// Parse a JSON plan document, validating every block.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let raw: serialization::RawPlan =
            serde_json::from_str(json).map_err(|e| PlanError::Serialization {
                reason: e.to_string(),
            })?;
        Plan::try_from(raw)
    }
}

impl From<Vec<Motion>> for Plan {
    fn from(motions: Vec<Motion>) -> Self {
        Plan::new(motions)
    }
}

fn motion_is_empty(motion: &Motion) -> bool {
    matches!(motion, Motion::Xy(m) if m.blocks().is_empty())
}

fn motion_instant(i: usize, motion: &Motion, start: f64, local: f64) -> Option<PlanInstant> {
    match motion {
        Motion::Xy(m) => m.instant(local).map(|mut instant| {
            instant.t += start;
            PlanInstant::Xy {
                motion_index: i,
                instant,
            }
        }),
        Motion::Pen(m) => Some(PlanInstant::Pen {
            motion_index: i,
            t: start + local.clamp(0.0, m.duration()),
            position: m.position_at(local),
        }),
    }
}
