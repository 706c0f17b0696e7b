//! In-process mesh transport.
//!
//! A [`LoopbackMesh`] hub holds one queue per attached node and the
//! parent/child links between them. Each [`LoopbackPort`] implements
//! [`MeshTransport`] for one node.

use crate::error::TransportError;
use crate::transport::{MeshTransport, RecvMeta, SendFlags};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use mesh_topology::MeshAddr;
use mesh_wire::RxBuffer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

#[derive(Debug)]
struct Envelope {
    from: MeshAddr,
    data: Bytes,
}

#[derive(Debug, Clone)]
struct Mailbox {
    tx: mpsc::UnboundedSender<Envelope>,
    pending: Arc<AtomicUsize>,
}

/// Hub connecting in-process nodes
#[derive(Debug, Default)]
pub struct LoopbackMesh {
    mailboxes: DashMap<MeshAddr, Mailbox>,
    parents: DashMap<MeshAddr, MeshAddr>,
    children: DashMap<MeshAddr, Vec<MeshAddr>>,
}

impl LoopbackMesh {
    /// Create an empty hub
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a node and return its transport endpoint
    pub fn attach(self: &Arc<Self>, addr: MeshAddr) -> LoopbackPort {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        self.mailboxes.insert(
            addr,
            Mailbox {
                tx,
                pending: pending.clone(),
            },
        );
        debug!("Loopback node {} attached", addr);

        LoopbackPort {
            hub: self.clone(),
            addr,
            rx: Mutex::new(rx),
            pending,
        }
    }

    /// Record `child` as a descendant of `parent`
    pub fn link(&self, child: MeshAddr, parent: MeshAddr) {
        if let Some(previous) = self.parents.insert(child, parent) {
            if previous != parent {
                if let Some(mut siblings) = self.children.get_mut(&previous) {
                    siblings.retain(|addr| *addr != child);
                }
            }
        }
        let mut siblings = self.children.entry(parent).or_default();
        if !siblings.contains(&child) {
            siblings.push(child);
        }
        info!("Loopback link {} -> {}", child, parent);
    }

    /// Remove `child` from its parent
    pub fn unlink(&self, child: MeshAddr) {
        if let Some((_, parent)) = self.parents.remove(&child) {
            if let Some(mut siblings) = self.children.get_mut(&parent) {
                siblings.retain(|addr| *addr != child);
            }
            info!("Loopback unlink {} from {}", child, parent);
        }
    }

    /// Children of `addr` in join order
    pub fn children_of(&self, addr: MeshAddr) -> Vec<MeshAddr> {
        self.children
            .get(&addr)
            .map(|siblings| siblings.clone())
            .unwrap_or_default()
    }

    fn deliver(&self, from: MeshAddr, to: MeshAddr, data: &[u8]) -> Result<(), TransportError> {
        let mailbox = self
            .mailboxes
            .get(&to)
            .map(|entry| entry.clone())
            .ok_or(TransportError::NoRoute(to))?;

        let envelope = Envelope {
            from,
            data: Bytes::copy_from_slice(data),
        };
        mailbox
            .tx
            .send(envelope)
            .map_err(|_| TransportError::Closed)?;
        // Counted only once the message is queued
        mailbox.pending.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// One node's endpoint on a [`LoopbackMesh`]
#[derive(Debug)]
pub struct LoopbackPort {
    hub: Arc<LoopbackMesh>,
    addr: MeshAddr,
    rx: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    pending: Arc<AtomicUsize>,
}

#[async_trait]
impl MeshTransport for LoopbackPort {
    fn local_addr(&self) -> MeshAddr {
        self.addr
    }

    async fn send(
        &self,
        to: Option<MeshAddr>,
        data: &[u8],
        _flags: SendFlags,
    ) -> Result<(), TransportError> {
        let to = match to {
            Some(addr) => addr,
            None => self
                .hub
                .parents
                .get(&self.addr)
                .map(|parent| *parent)
                .ok_or(TransportError::NoParent)?,
        };
        self.hub.deliver(self.addr, to, data)
    }

    async fn recv(
        &self,
        buf: &mut RxBuffer,
        timeout: Option<Duration>,
    ) -> Result<RecvMeta, TransportError> {
        let mut rx = self.rx.lock().await;
        let envelope = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx.recv())
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => rx.recv().await,
        }
        .ok_or(TransportError::Closed)?;

        // A receive can beat the sender's increment
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        buf.fill(&envelope.data).map_err(|_| TransportError::Overflow {
            len: envelope.data.len(),
            capacity: buf.capacity(),
        })?;

        Ok(RecvMeta {
            from: envelope.from,
            len: envelope.data.len(),
        })
    }

    fn rx_pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn routing_table(&self) -> Vec<MeshAddr> {
        self.hub.children_of(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_wire::RX_SIZE;

    fn addr(n: u16) -> MeshAddr {
        MeshAddr::from_device_id(n)
    }

    #[tokio::test]
    async fn test_leaf_to_parent_and_back() {
        let hub = LoopbackMesh::new();
        let root = hub.attach(addr(1000));
        let leaf = hub.attach(addr(1));
        hub.link(addr(1), addr(1000));

        leaf.send(None, b"hello", SendFlags::empty()).await.unwrap();
        assert_eq!(root.rx_pending(), 1);

        let mut buf = RxBuffer::new();
        let meta = root.recv(&mut buf, Some(Duration::ZERO)).await.unwrap();
        assert_eq!(meta.from, addr(1));
        assert_eq!(buf.filled(), b"hello");
        assert_eq!(root.rx_pending(), 0);

        root.send(Some(addr(1)), b"0", SendFlags::P2P).await.unwrap();
        let meta = leaf.recv(&mut buf, None).await.unwrap();
        assert_eq!(meta.from, addr(1000));
        assert_eq!(buf.filled(), b"0");
    }

    #[tokio::test]
    async fn test_routing_table_join_order() {
        let hub = LoopbackMesh::new();
        let root = hub.attach(addr(1000));
        for n in [3, 1, 2] {
            hub.link(addr(n), addr(1000));
        }
        hub.link(addr(1), addr(1000));
        assert_eq!(root.routing_table(), vec![addr(3), addr(1), addr(2)]);

        hub.unlink(addr(1));
        assert_eq!(root.routing_table(), vec![addr(3), addr(2)]);
    }

    #[tokio::test]
    async fn test_relink_to_new_parent_moves_child() {
        let hub = LoopbackMesh::new();
        let root = hub.attach(addr(1000));
        let relay = hub.attach(addr(7));
        hub.link(addr(1), addr(1000));
        hub.link(addr(2), addr(1000));
        hub.link(addr(2), addr(1000));
        assert_eq!(root.routing_table(), vec![addr(1), addr(2)]);

        hub.link(addr(1), addr(7));
        assert_eq!(root.routing_table(), vec![addr(2)]);
        assert_eq!(relay.routing_table(), vec![addr(1)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pending_count_implies_queued_message() {
        let hub = LoopbackMesh::new();
        let root = hub.attach(addr(1000));
        let leaf = hub.attach(addr(1));
        hub.link(addr(1), addr(1000));

        let sender = tokio::spawn(async move {
            for _ in 0..200 {
                leaf.send(None, b"q", SendFlags::empty()).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut buf = RxBuffer::new();
        let mut received = 0;
        while received < 200 {
            if root.rx_pending() > 0 {
                root.recv(&mut buf, Some(Duration::ZERO))
                    .await
                    .expect("pending count without a queued message");
                received += 1;
            } else {
                tokio::task::yield_now().await;
            }
        }
        sender.await.unwrap();
        assert_eq!(root.rx_pending(), 0);
        assert_eq!(
            root.recv(&mut buf, Some(Duration::ZERO)).await,
            Err(TransportError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_send_errors() {
        let hub = LoopbackMesh::new();
        let orphan = hub.attach(addr(5));
        assert_eq!(
            orphan.send(None, b"x", SendFlags::empty()).await,
            Err(TransportError::NoParent)
        );
        assert_eq!(
            orphan.send(Some(addr(9)), b"x", SendFlags::P2P).await,
            Err(TransportError::NoRoute(addr(9)))
        );

        let gone = hub.attach(addr(6));
        drop(gone);
        assert_eq!(
            orphan.send(Some(addr(6)), b"x", SendFlags::P2P).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_recv_timeout_and_overflow() {
        let hub = LoopbackMesh::new();
        let root = hub.attach(addr(1000));
        let mut buf = RxBuffer::new();
        assert_eq!(
            root.recv(&mut buf, Some(Duration::from_millis(1))).await,
            Err(TransportError::Timeout)
        );

        let leaf = hub.attach(addr(1));
        hub.link(addr(1), addr(1000));
        leaf.send(None, &vec![b'a'; RX_SIZE + 1], SendFlags::empty())
            .await
            .unwrap();
        assert!(matches!(
            root.recv(&mut buf, None).await,
            Err(TransportError::Overflow { .. })
        ));
    }
}
