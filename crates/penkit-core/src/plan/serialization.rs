//! Plan wire format.
//!
//! ```text
//! { "motions": [
//!     { "t": "XYMotion", "blocks": [ { "accel", "duration", "vInitial", "p1": {x,y}, "p2": {x,y} } ] },
//!     { "t": "PenMotion", "initialPos", "finalPos", "duration" }
//! ] }
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Block, Motion, PenMotion, Plan, XyMotion};
use crate::error::PlanError;
use crate::geometry::Point;

const XY_TAG: &str = "XYMotion";
const PEN_TAG: &str = "PenMotion";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PointRecord {
    x: f64,
    y: f64,
}

impl From<Point> for PointRecord {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<PointRecord> for Point {
    fn from(p: PointRecord) -> Self {
        Point::new(p.x, p.y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockRecord {
    accel: f64,
    duration: f64,
    v_initial: f64,
    p1: PointRecord,
    p2: PointRecord,
}

impl From<&Block> for BlockRecord {
    fn from(b: &Block) -> Self {
        Self {
            accel: b.accel(),
            duration: b.duration(),
            v_initial: b.v_initial(),
            p1: b.p1().into(),
            p2: b.p2().into(),
        }
    }
}

impl TryFrom<BlockRecord> for Block {
    type Error = PlanError;

    fn try_from(r: BlockRecord) -> Result<Self, Self::Error> {
        Block::new(r.accel, r.duration, r.v_initial, r.p1.into(), r.p2.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct XyRecord {
    blocks: Vec<BlockRecord>,
}

/// Servo positions are written as integers but accepted as any number.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PenRecord {
    initial_pos: f64,
    final_pos: f64,
    duration: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PenOut {
    initial_pos: i32,
    final_pos: i32,
    duration: f64,
}

#[derive(Serialize)]
#[serde(tag = "t")]
enum MotionRecord {
    #[serde(rename = "XYMotion")]
    Xy(XyRecord),
    #[serde(rename = "PenMotion")]
    Pen(PenOut),
}

impl From<&Motion> for MotionRecord {
    fn from(m: &Motion) -> Self {
        match m {
            Motion::Xy(xy) => MotionRecord::Xy(XyRecord {
                blocks: xy.blocks().iter().map(BlockRecord::from).collect(),
            }),
            Motion::Pen(pen) => MotionRecord::Pen(PenOut {
                initial_pos: pen.initial_pos,
                final_pos: pen.final_pos,
                duration: pen.duration(),
            }),
        }
    }
}

#[derive(Serialize)]
struct PlanRecord {
    motions: Vec<MotionRecord>,
}

/// A motion whose tag has not been checked yet.
#[derive(Debug, Deserialize)]
pub(super) struct RawMotion {
    t: String,
    #[serde(flatten)]
    body: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawPlan {
    motions: Vec<RawMotion>,
}

fn body_error(e: serde_json::Error) -> PlanError {
    PlanError::Serialization {
        reason: e.to_string(),
    }
}

impl TryFrom<RawMotion> for Motion {
    type Error = PlanError;

    fn try_from(raw: RawMotion) -> Result<Self, Self::Error> {
        let body = serde_json::Value::Object(raw.body);
        match raw.t.as_str() {
            XY_TAG => {
                let record: XyRecord = serde_json::from_value(body).map_err(body_error)?;
                let blocks = record
                    .blocks
                    .into_iter()
                    .map(Block::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Motion::Xy(XyMotion::new(blocks)))
            }
            PEN_TAG => {
                let record: PenRecord = serde_json::from_value(body).map_err(body_error)?;
                Ok(Motion::Pen(PenMotion::new(
                    record.initial_pos.round() as i32,
                    record.final_pos.round() as i32,
                    record.duration,
                )))
            }
            other => Err(PlanError::UnknownMotionType {
                tag: other.to_string(),
            }),
        }
    }
}

impl TryFrom<RawPlan> for Plan {
    type Error = PlanError;

    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        let motions = raw
            .motions
            .into_iter()
            .map(Motion::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Plan::new(motions))
    }
}

impl Serialize for Plan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PlanRecord {
            motions: self.motions().iter().map(MotionRecord::from).collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Plan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPlan::deserialize(deserializer)?;
        Plan::try_from(raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let block = Block::new(2.0, 0.5, 1.0, Point::new(1.0, 2.0), Point::new(3.0, 4.0)).unwrap();
        let plan = Plan::new(vec![
            Motion::Xy(XyMotion::new(vec![block])),
            Motion::Pen(PenMotion::new(17750, 15700, 0.12)),
        ]);
        let value: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();

        let xy = &value["motions"][0];
        assert_eq!(xy["t"], "XYMotion");
        assert_eq!(xy["blocks"][0]["vInitial"], 1.0);
        assert_eq!(xy["blocks"][0]["accel"], 2.0);
        assert_eq!(xy["blocks"][0]["p2"]["y"], 4.0);

        let pen = &value["motions"][1];
        assert_eq!(pen["t"], "PenMotion");
        assert_eq!(pen["initialPos"], 17750);
        assert_eq!(pen["finalPos"], 15700);
        assert_eq!(pen["duration"], 0.12);
    }

    #[test]
    fn test_round_trip() {
        let a = Block::new(200.0, 0.2236, 0.0, Point::ZERO, Point::new(5.0, 0.0)).unwrap();
        let b = Block::new(-200.0, 0.2236, 44.72, Point::new(5.0, 0.0), Point::new(10.0, 0.0))
            .unwrap();
        let plan = Plan::new(vec![
            Motion::Xy(XyMotion::new(vec![a, b])),
            Motion::Pen(PenMotion::new(17750, 28000, 0.12)),
        ]);
        let back = Plan::from_json(&plan.to_json().unwrap()).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_rejects_unknown_tag() {
        let json = r#"{"motions":[{"t":"ZMotion","depth":1}]}"#;
        assert_eq!(
            Plan::from_json(json),
            Err(PlanError::UnknownMotionType {
                tag: "ZMotion".to_string()
            })
        );
        assert!(serde_json::from_str::<Plan>(json).is_err());
    }

    #[test]
    fn test_rejects_invalid_block() {
        let json = r#"{"motions":[{"t":"XYMotion","blocks":[
            {"accel":0,"duration":1,"vInitial":-1,"p1":{"x":0,"y":0},"p2":{"x":1,"y":0}}
        ]}]}"#;
        assert!(matches!(
            Plan::from_json(json),
            Err(PlanError::InvalidBlock { .. })
        ));
    }
}
