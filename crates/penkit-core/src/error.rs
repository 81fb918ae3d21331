//! Error handling for penkit
//!
//! Errors are layered the same way the system is:
//! - Plan errors (invalid blocks, unreadable plan documents)
//! - Device errors (precondition violations caught before any I/O)
//! - Protocol errors (the device answered, but not with what we asked for)
//! - Connection errors (the serial link itself)
//! - Session errors (plot contention and control requests)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Plan model error type
///
/// Raised while building, planning or deserializing a motion plan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// A block violates the non-negative velocity invariants
    #[error("Invalid block: {reason}")]
    InvalidBlock {
        /// Which invariant was violated.
        reason: String,
    },

    /// A serialized motion carried a tag we do not know
    #[error("Unknown motion type: {tag}")]
    UnknownMotionType {
        /// The unrecognized `t` tag.
        tag: String,
    },

    /// An acceleration profile cannot be planned with
    #[error("Invalid profile: {reason}")]
    InvalidProfile {
        /// The reason the profile was rejected.
        reason: String,
    },

    /// The plan document could not be parsed or written
    #[error("Plan serialization failed: {reason}")]
    Serialization {
        /// The underlying serializer message.
        reason: String,
    },
}

/// Device precondition error type
///
/// These are rejected synchronously before anything is written to the
/// serial link and are never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Microstepping mode must be in 1..=5
    #[error("Microstepping mode must be between 1 and 5, but was {mode}")]
    InvalidMicrostepping {
        /// The rejected mode.
        mode: u8,
    },

    /// A move must step at least one axis
    #[error("Must move on at least one axis")]
    NoMotion,

    /// Step rates must be non-negative and not both zero
    #[error("Invalid step rates: initial={initial}, final={final_rate}")]
    InvalidRates {
        /// Initial step rate in steps per second.
        initial: f64,
        /// Final step rate in steps per second.
        final_rate: f64,
    },

    /// The homing step rate must be positive
    #[error("Home step rate must be greater than 0")]
    InvalidHomeRate,

    /// Moves are refused after the motors were halted, until re-enabled
    #[error("Motors halted, enable them before moving")]
    Halted,

    /// No device is attached to the session
    #[error("No device attached")]
    NotAttached,
}

/// Protocol error type
///
/// The device answered, but the answer fails the in-flight operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The device reported an error line (starting with `!`)
    #[error("Device reported error: {message}")]
    DeviceReported {
        /// The full error line sent by the device.
        message: String,
    },

    /// A literal acknowledgement was expected, something else arrived
    #[error("Expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// The token that was expected.
        expected: String,
        /// The literal content that arrived instead.
        actual: String,
    },

    /// A response could not be interpreted
    #[error("Malformed response to {command}: {response}")]
    MalformedResponse {
        /// The command whose response was malformed.
        command: String,
        /// The offending response text.
        response: String,
    },
}

/// Connection error type
///
/// Represents failures of the serial transport itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// No matching port was found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Port enumeration failed
    #[error("Failed to enumerate ports: {reason}")]
    Enumeration {
        /// The reason enumeration failed.
        reason: String,
    },
}

/// Session error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// A plot is already active in this session
    #[error("Plot in progress")]
    Busy,

    /// A control request arrived while no plot is running
    #[error("No plot in progress")]
    NotPlotting,

    /// The running plot cannot take this request in its current state
    #[error("Cannot {request} while {state}")]
    InvalidState {
        /// The rejected request.
        request: String,
        /// Session state when it arrived.
        state: String,
    },
}

/// Main error type for penkit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Plan error
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Device precondition error
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Session error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a precondition violation
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Device(_))
    }

    /// Check if this is the busy signal from a session
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Session(SessionError::Busy))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::UnexpectedResponse {
            expected: "OK".to_string(),
            actual: "NOPE".to_string(),
        };
        assert_eq!(err.to_string(), "Expected OK, got NOPE");

        let err = DeviceError::InvalidMicrostepping { mode: 7 };
        assert_eq!(
            err.to_string(),
            "Microstepping mode must be between 1 and 5, but was 7"
        );

        let err = ProtocolError::DeviceReported {
            message: "!8 Err: Unknown command".to_string(),
        };
        assert!(err.to_string().contains("!8 Err: Unknown command"));

        let err = SessionError::InvalidState {
            request: "pause".to_string(),
            state: "Cancelling".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot pause while Cancelling");
    }

    #[test]
    fn test_error_classification() {
        let err: Error = ConnectionError::ConnectionLost {
            reason: "unplugged".to_string(),
        }
        .into();
        assert!(err.is_connection_error());
        assert!(!err.is_protocol_error());

        let err: Error = DeviceError::NoMotion.into();
        assert!(err.is_precondition());

        let err: Error = DeviceError::Halted.into();
        assert!(err.is_precondition());
        assert!(!err.is_connection_error());

        let err: Error = SessionError::Busy.into();
        assert!(err.is_busy());
        assert_eq!(err.to_string(), "Plot in progress");
    }
}
