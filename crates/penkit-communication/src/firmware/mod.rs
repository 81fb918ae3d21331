//! Firmware-specific protocol implementations.

pub mod ebb;
