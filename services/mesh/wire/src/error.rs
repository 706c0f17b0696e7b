//! Wire error types.

use thiserror::Error;

/// Errors raised while encoding or decoding mesh and collector payloads
#[derive(Error, Debug)]
pub enum WireError {
    /// Write would exceed the buffer capacity
    #[error("size limit exceeded: {len} > {capacity}")]
    Size {
        /// Requested length
        len: usize,
        /// Declared capacity
        capacity: usize,
    },

    /// Payload is not valid UTF-8
    #[error("payload is not utf-8")]
    Utf8(#[from] std::str::Utf8Error),

    /// Fragment is not a JSON object or list of objects
    #[error("malformed fragment: {0}")]
    Fragment(String),

    /// JSON encoding or decoding failed
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown reading kind name
    #[error("unknown reading kind {0:?}")]
    Kind(String),

    /// Unknown body location name or code
    #[error("unknown body location {0:?}")]
    Location(String),

    /// Response code payload could not be parsed
    #[error("invalid response code {0:?}")]
    Code(String),
}
