//! # Event Bus Module
//!
//! Publish/subscribe fan-out for plot session notifications.
//!
//! - Publishers emit typed events without knowing subscribers
//! - Subscribers filter by category
//! - Publishing is best-effort: a failing or slow observer never blocks
//!   or fails the publisher
//!
//! ## Usage
//!
//! ```rust,ignore
//! use penkit_core::event_bus::{EventBus, EventCategory, EventFilter, PlotEvent};
//!
//! let bus = EventBus::new();
//! let subscription = bus.subscribe(
//!     EventFilter::Categories(vec![EventCategory::Plot]),
//!     |event| {
//!         println!("{}", event.description());
//!         Ok(())
//!     },
//! );
//!
//! bus.publish(PlotEvent::PlotFinished);
//! bus.unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
