//! Mapping and lifecycle error types

use iichid_transport::TransportError;
use thiserror::Error;

/// Errors from resolving a map table or running a mapped device
#[derive(Error, Debug)]
pub enum MapError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A required map entry found no usable field
    #[error("Missing required usage {usage} ({name})")]
    MissingCapability { name: String, usage: String },

    /// Not a single map entry matched the descriptor
    #[error("No usages of the map matched the report descriptor")]
    NothingMapped,

    /// Profile or table definition is unusable
    #[error("Invalid map entry: {0}")]
    InvalidEntry(String),
}
