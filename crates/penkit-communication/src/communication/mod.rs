//! Byte-level links to a plotter controller.
//!
//! A link is a blocking, line-agnostic byte pipe with short read timeouts.
//! Framing and request tracking live in the firmware layer.

pub mod mock;
pub mod serial;
