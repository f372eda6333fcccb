//! Transport error types

use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    /// Interrupt or bus resource could not be allocated.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Firmware described a resource of an unexpected kind.
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// HID descriptor failed length or version validation.
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    /// Bus transaction failed.
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Bad message: expected report id {expected}, got {actual}")]
    BadMessage { expected: u8, actual: u16 },

    /// The delivery actor is gone.
    #[error("Delivery stopped")]
    Stopped,

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}
