//! Mesh transport seam.

use crate::error::TransportError;
use async_trait::async_trait;
use bitflags::bitflags;
use mesh_topology::MeshAddr;
use mesh_wire::RxBuffer;
use std::time::Duration;

bitflags! {
    /// Send flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SendFlags: u8 {
        /// Deliver point-to-point to the given address
        const P2P = 1 << 0;
    }
}

/// Metadata of one received payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvMeta {
    /// Sender
    pub from: MeshAddr,
    /// Bytes written into the buffer
    pub len: usize,
}

/// One-hop mesh primitives with declared capacity limits
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// This node's address
    fn local_addr(&self) -> MeshAddr;

    /// Send one payload. `None` sends to the parent.
    async fn send(
        &self,
        to: Option<MeshAddr>,
        data: &[u8],
        flags: SendFlags,
    ) -> Result<(), TransportError>;

    /// Receive one payload into `buf`. `None` waits indefinitely.
    async fn recv(
        &self,
        buf: &mut RxBuffer,
        timeout: Option<Duration>,
    ) -> Result<RecvMeta, TransportError>;

    /// Payloads queued for this node
    fn rx_pending(&self) -> usize;

    /// Descendants reachable through this node, self excluded, in join order
    fn routing_table(&self) -> Vec<MeshAddr>;
}
