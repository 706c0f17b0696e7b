//! Aggregation error types.

use mesh_dataplane::DataPlaneError;
use mesh_wire::{ReadingKind, WireError};
use thiserror::Error;

/// The local sensor could not produce a reading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The sensor does not report this kind
    #[error("{0} is not supported by this sensor")]
    Unsupported(ReadingKind),

    /// The sensor did not answer
    #[error("sensor read failed: {0}")]
    Read(String),
}

/// Publishing to the collector failed
#[derive(Error, Debug)]
pub enum PublishError {
    /// Could not connect
    #[error("couldn't connect to collector: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Socket error while sending
    #[error("socket error while sending: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// Socket error while receiving
    #[error("socket error while receiving: {0}")]
    ReadFailed(#[source] std::io::Error),
}

/// Aggregation errors
#[derive(Error, Debug)]
pub enum AggregationError {
    /// Not attached to a parent
    #[error("not connected to the mesh")]
    NoNetwork,

    /// The leaf's response slot held no usable code
    #[error("no response from parent")]
    NoResponse,

    /// Publish failed; leaves were sent a failure code
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Local reading failed
    #[error(transparent)]
    Sensor(#[from] SensorError),

    /// Encoding failed
    #[error(transparent)]
    Wire(#[from] WireError),

    /// One-hop transfer failed
    #[error(transparent)]
    DataPlane(#[from] DataPlaneError),
}
