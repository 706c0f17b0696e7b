//! Topology error types.

use thiserror::Error;

/// Error reported by the radio driver, code kept verbatim
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("driver error {code:#x}: {message}")]
pub struct DriverError {
    /// Driver specific status code
    pub code: i32,
    /// Human readable context
    pub message: String,
}

impl DriverError {
    /// Create a new driver error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Topology errors
#[derive(Error, Debug)]
pub enum TopologyError {
    /// SSID or password longer than the radio field
    #[error("{field} is {len} bytes, limit is {limit}")]
    CredentialTooLong {
        /// Which credential
        field: &'static str,
        /// Supplied length
        len: usize,
        /// Field capacity
        limit: usize,
    },

    /// Tree depth outside the supported range
    #[error("max layer must be 1 or 2, got {0}")]
    MaxLayer(u8),

    /// Mesh id or address text could not be parsed
    #[error("invalid mesh address {0:?}")]
    Address(String),

    /// Scan produced no usable parent
    #[error("no parent found among {0} scanned access points")]
    NoParentFound(usize),

    /// Radio driver call failed
    #[error(transparent)]
    Driver(#[from] DriverError),
}
