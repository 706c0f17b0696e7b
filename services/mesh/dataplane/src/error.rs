//! Data plane error types.

use mesh_topology::{MeshAddr, NodeRole};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a [`crate::MeshTransport`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing arrived within the receive timeout
    #[error("receive timed out")]
    Timeout,

    /// No route to the destination
    #[error("no route to {0}")]
    NoRoute(MeshAddr),

    /// This node has no parent to send to
    #[error("no parent attached")]
    NoParent,

    /// Payload larger than the receive buffer
    #[error("payload of {len} bytes exceeds receive capacity {capacity}")]
    Overflow {
        /// Payload length
        len: usize,
        /// Buffer capacity
        capacity: usize,
    },

    /// The transport was shut down
    #[error("transport closed")]
    Closed,

    /// Driver status code, kept verbatim
    #[error("driver error {0:#x}")]
    Driver(i32),
}

/// Data plane errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataPlaneError {
    /// Payload larger than the transmit buffer
    #[error("payload of {len} bytes exceeds transmit capacity {limit}")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Transmit capacity
        limit: usize,
    },

    /// Target does not fit this node's role
    #[error("{role} cannot send to {target}")]
    WrongTarget {
        /// This node's role
        role: NodeRole,
        /// Requested target
        target: String,
    },

    /// Pending fragments did not arrive in time
    #[error("pending wait timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}
