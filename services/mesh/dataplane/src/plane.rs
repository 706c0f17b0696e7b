//! One-hop send and receive rounds.

use crate::error::DataPlaneError;
use crate::transport::{MeshTransport, SendFlags};
use mesh_topology::{MeshAddr, NodeRole};
use mesh_wire::{RxBuffer, TxBuffer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Interval between pending-counter polls on the root
pub const PENDING_POLL: Duration = Duration::from_millis(5);

/// Where a payload goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A known child, addressed point-to-point (root only)
    Peer(MeshAddr),
    /// This node's parent (leaf only)
    Parent,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Peer(addr) => write!(f, "peer {}", addr),
            Target::Parent => write!(f, "parent"),
        }
    }
}

/// Outcome of one receive slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Payload text
    Fragment(String),
    /// The receive completed with zero bytes
    NoData,
}

/// Send and receive over one hop of the tree
pub struct DataPlane {
    transport: Arc<dyn MeshTransport>,
    role: NodeRole,
    pending_bound: Option<Duration>,
}

impl fmt::Debug for DataPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPlane")
            .field("addr", &self.transport.local_addr())
            .field("role", &self.role)
            .field("pending_bound", &self.pending_bound)
            .finish()
    }
}

impl DataPlane {
    /// Create a data plane for a node whose role is settled
    pub fn new(transport: Arc<dyn MeshTransport>, role: NodeRole) -> Self {
        Self {
            transport,
            role,
            pending_bound: None,
        }
    }

    /// Bound the root's pending wait; `None` waits indefinitely
    pub fn with_pending_bound(mut self, bound: Option<Duration>) -> Self {
        self.pending_bound = bound;
        self
    }

    /// Role this plane sends as
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Children currently in the routing table
    pub fn known_children(&self) -> Vec<MeshAddr> {
        self.transport.routing_table()
    }

    /// Slots a receive round should expect: known children on the root, one elsewhere
    pub fn expected_count(&self) -> usize {
        match self.role {
            NodeRole::Root => self.known_children().len(),
            _ => 1,
        }
    }

    /// Send one payload to `target`
    pub async fn send(&self, payload: &[u8], target: Target) -> Result<(), DataPlaneError> {
        let mut tx = TxBuffer::new();
        tx.fill(payload).map_err(|_| DataPlaneError::PayloadTooLarge {
            len: payload.len(),
            limit: tx.capacity(),
        })?;

        let (to, flags) = match (self.role, target) {
            (NodeRole::Root, Target::Peer(addr)) => (Some(addr), SendFlags::P2P),
            (NodeRole::Leaf, Target::Parent) => (None, SendFlags::empty()),
            (role, target) => {
                return Err(DataPlaneError::WrongTarget {
                    role,
                    target: target.to_string(),
                })
            }
        };

        self.transport.send(to, tx.as_slice(), flags).await?;
        debug!("Sent {} bytes to {}", payload.len(), target);
        Ok(())
    }

    /// Send `payload` to every known child; failures are logged and skipped.
    ///
    /// Returns the number of children reached.
    pub async fn fan_out(&self, payload: &[u8]) -> Result<usize, DataPlaneError> {
        if self.role != NodeRole::Root {
            return Err(DataPlaneError::WrongTarget {
                role: self.role,
                target: "every child".to_string(),
            });
        }

        let children = self.known_children();
        let mut delivered = 0;
        for addr in &children {
            match self.send(payload, Target::Peer(*addr)).await {
                Ok(()) => delivered += 1,
                Err(e @ DataPlaneError::PayloadTooLarge { .. }) => return Err(e),
                Err(e) => warn!("Send to child {} failed: {}", addr, e),
            }
        }

        debug!("Fanned out to {}/{} children", delivered, children.len());
        Ok(delivered)
    }

    /// Perform up to `expected` bounded receives.
    ///
    /// A zero-length receive yields [`Slot::NoData`]; a failed receive is
    /// logged and produces no slot, so the result may be shorter than
    /// `expected` but never longer.
    pub async fn receive_round(&self, expected: usize, timeout: Option<Duration>) -> Vec<Slot> {
        let mut buf = RxBuffer::new();
        let mut slots = Vec::with_capacity(expected);

        for slot in 0..expected {
            buf.clear();
            match self.transport.recv(&mut buf, timeout).await {
                Ok(meta) if meta.len == 0 || buf.is_empty() => {
                    debug!("Slot {} from {}: no data", slot, meta.from);
                    slots.push(Slot::NoData);
                }
                Ok(meta) => match buf.as_str() {
                    Ok(text) => {
                        debug!("Slot {} from {}: {} bytes", slot, meta.from, meta.len);
                        slots.push(Slot::Fragment(text.trim_end_matches('\0').to_string()));
                    }
                    Err(e) => warn!("Slot {} from {} dropped: {}", slot, meta.from, e),
                },
                Err(e) => warn!("Receive for slot {} failed: {}", slot, e),
            }
        }

        slots
    }

    /// Wait until every known child has a payload pending.
    ///
    /// Polls every [`PENDING_POLL`]; returns the pending count clamped to the
    /// number of known children. Leaves return at once.
    pub async fn wait_pending(&self) -> Result<usize, DataPlaneError> {
        if self.role != NodeRole::Root {
            return Ok(self.transport.rx_pending().min(1));
        }

        let started = Instant::now();
        loop {
            let known = self.known_children().len();
            let pending = self.transport.rx_pending();
            if pending >= known {
                return Ok(pending.min(known));
            }

            if let Some(bound) = self.pending_bound {
                if started.elapsed() >= bound {
                    warn!("Only {}/{} children pending after {:?}", pending, known, bound);
                    return Err(DataPlaneError::Timeout(bound));
                }
            }

            tokio::time::sleep(PENDING_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackMesh, LoopbackPort};
    use crate::TransportError;
    use mesh_wire::TX_SIZE;

    const ROOT: u16 = 1000;

    fn addr(n: u16) -> MeshAddr {
        MeshAddr::from_device_id(n)
    }

    fn star(leaves: u16) -> (Arc<LoopbackMesh>, DataPlane, Vec<DataPlane>) {
        let hub = LoopbackMesh::new();
        let root = DataPlane::new(Arc::new(hub.attach(addr(ROOT))), NodeRole::Root);
        let leaves = (1..=leaves)
            .map(|n| {
                let port: LoopbackPort = hub.attach(addr(n));
                hub.link(addr(n), addr(ROOT));
                DataPlane::new(Arc::new(port), NodeRole::Leaf)
            })
            .collect();
        (hub, root, leaves)
    }

    #[tokio::test]
    async fn test_send_rejects_oversize_and_wrong_target() {
        let (_hub, root, leaves) = star(1);

        let err = leaves[0].send(&vec![b'x'; TX_SIZE + 1], Target::Parent).await.unwrap_err();
        assert_eq!(
            err,
            DataPlaneError::PayloadTooLarge {
                len: TX_SIZE + 1,
                limit: TX_SIZE
            }
        );
        leaves[0].send(&vec![b'x'; TX_SIZE], Target::Parent).await.unwrap();

        assert!(matches!(
            root.send(b"0", Target::Parent).await,
            Err(DataPlaneError::WrongTarget { role: NodeRole::Root, .. })
        ));
        assert!(matches!(
            leaves[0].send(b"0", Target::Peer(addr(ROOT))).await,
            Err(DataPlaneError::WrongTarget { role: NodeRole::Leaf, .. })
        ));
    }

    #[tokio::test]
    async fn test_expected_count() {
        let (_hub, root, leaves) = star(3);
        assert_eq!(root.expected_count(), 3);
        assert_eq!(leaves[2].expected_count(), 1);
        assert_eq!(root.known_children(), vec![addr(1), addr(2), addr(3)]);
        assert!(leaves[2].known_children().is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_skips_failed_peer() {
        let (hub, root, mut leaves) = star(3);
        // A child whose endpoint is gone but still listed in the table
        drop(leaves.remove(1));
        assert_eq!(hub.children_of(addr(ROOT)).len(), 3);

        assert_eq!(root.fan_out(b"0").await.unwrap(), 2);
        for leaf in &leaves {
            let slots = leaf.receive_round(1, None).await;
            assert_eq!(slots, vec![Slot::Fragment("0".to_string())]);
        }
        assert!(leaves[0].fan_out(b"0").await.is_err());
    }

    #[tokio::test]
    async fn test_receive_round_no_data_slot() {
        let (_hub, root, leaves) = star(2);
        leaves[0].send(b"", Target::Parent).await.unwrap();
        leaves[1].send(br#"{"type":"Gyro"}"#, Target::Parent).await.unwrap();

        assert_eq!(root.wait_pending().await.unwrap(), 2);
        let slots = root.receive_round(root.expected_count(), Some(Duration::ZERO)).await;
        assert_eq!(
            slots,
            vec![Slot::NoData, Slot::Fragment(r#"{"type":"Gyro"}"#.to_string())]
        );
    }

    #[tokio::test]
    async fn test_receive_round_never_exceeds_expected() {
        let (_hub, root, leaves) = star(3);
        for leaf in &leaves {
            leaf.send(b"[]", Target::Parent).await.unwrap();
        }
        // One extra payload is queued beyond the round
        leaves[0].send(b"[]", Target::Parent).await.unwrap();

        let slots = root.receive_round(3, Some(Duration::ZERO)).await;
        assert_eq!(slots.len(), 3);
    }

    #[tokio::test]
    async fn test_receive_round_tolerates_failed_slots() {
        let (_hub, root, leaves) = star(3);
        leaves[0].send(b"a", Target::Parent).await.unwrap();
        leaves[2].send(b"c", Target::Parent).await.unwrap();

        let slots = root.receive_round(3, Some(Duration::from_millis(10))).await;
        assert_eq!(
            slots,
            vec![Slot::Fragment("a".to_string()), Slot::Fragment("c".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_pending_bound() {
        let (_hub, root, leaves) = star(2);
        leaves[0].send(b"a", Target::Parent).await.unwrap();

        let root = root.with_pending_bound(Some(Duration::from_millis(50)));
        assert_eq!(
            root.wait_pending().await,
            Err(DataPlaneError::Timeout(Duration::from_millis(50)))
        );

        leaves[1].send(b"b", Target::Parent).await.unwrap();
        leaves[1].send(b"b", Target::Parent).await.unwrap();
        assert_eq!(root.wait_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_leaf_without_parent() {
        let hub = LoopbackMesh::new();
        let leaf = DataPlane::new(Arc::new(hub.attach(addr(1))), NodeRole::Leaf);
        assert_eq!(
            leaf.send(b"a", Target::Parent).await,
            Err(DataPlaneError::Transport(TransportError::NoParent))
        );
    }
}
