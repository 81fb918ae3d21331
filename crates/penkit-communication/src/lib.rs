//! # Penkit Communication
//!
//! Serial transport and device driver for EBB-based pen plotters.
//! - `communication`: the serial link abstraction, port enumeration and an
//!   in-memory link for tests and dry runs
//! - `firmware::ebb`: the EBB command/response protocol and the motion driver
//! - `discovery`: background (re)acquisition of a device

pub mod communication;
pub mod discovery;
pub mod firmware;

pub use communication::{
    mock::{MockLinkHandle, MockSerialLink, Responder},
    serial::{
        is_ebb, list_ebb_ports, list_ports, LinkProvider, RealSerialLink, SerialLink,
        SerialPortInfo, SystemLinkProvider,
    },
};

pub use discovery::{connect_once, spawn_discovery};

pub use firmware::ebb::{Ebb, EbbConfig, FirmwareVersion, Voltages};
