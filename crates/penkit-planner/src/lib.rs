//! # Penkit Planner
//!
//! Turns polylines into a time-parameterized [`Plan`](penkit_core::Plan):
//! - `optimization`: reorder, filter and merge paths to cut pen-up travel
//! - `planning`: constant-acceleration velocity profiles with cornering limits
//! - `profile`: acceleration, tooling and machine profiles
//! - `prepare`: the full pipeline from millimetre paths to a step-unit plan

pub mod optimization;
pub mod planning;
pub mod prepare;
pub mod profile;

pub use optimization::{dedup_points, elide_short_paths, join_nearby, optimize, path_length};
pub use planning::{constant_acceleration_plan, plan};
pub use prepare::{replan, PlanOptions};
pub use profile::{AccelerationProfile, MachineProfile, ToolingProfile};
