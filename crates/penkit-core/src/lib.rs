//! # Penkit Core
//!
//! Core types shared by every penkit crate:
//! - the plan model (blocks, XY and pen motions, serialization)
//! - 2D point helpers
//! - the layered error taxonomy
//! - the event bus used to publish plot session notifications

pub mod error;
pub mod event_bus;
pub mod geometry;
pub mod plan;

pub use error::{
    ConnectionError, DeviceError, Error, PlanError, ProtocolError, Result, SessionError,
};

pub use event_bus::{
    EventBus, EventBusConfig, EventBusError, EventCategory, EventFilter, PlotEvent,
    SubscriptionId,
};

pub use geometry::{Point, Polyline, EPSILON};

pub use plan::{Block, Instant, Motion, PenMotion, Plan, PlanInstant, XyMotion};
