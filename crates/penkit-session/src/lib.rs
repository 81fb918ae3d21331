//! # Penkit Session
//!
//! Runs plans against a plotter one at a time, with cooperative pause,
//! resume, cancel and limp, and publishes progress on the session's event
//! bus.

pub mod plotter;
pub mod session;
pub mod state;

pub use plotter::{DevicePlotter, Plotter, SimulatedPlotter};
pub use session::PlotSession;
pub use state::{SessionConfig, SessionState};
