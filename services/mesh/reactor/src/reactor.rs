//! Event reactor: radio events in, topology actions and connection bits out.

use crate::event::MeshEvent;
use crate::state::{ConnectionBits, ConnectionState, WaitError};
use mesh_topology::{NodeRole, ScanDriver, ScanMode, ScanOutcome, TopologyError, TopologyManager};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Connection progress of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    /// Mesh stack not running
    Stopped,
    /// Stack running, no scan yet
    Started,
    /// Looking for a parent
    Scanning,
    /// Parent selected, association in progress
    ParentConnecting,
    /// Attached to the parent
    ParentConnected,
    /// Root attached upstream, waiting for an address
    RootAwaitingIp,
    /// Root has an address, waiting for children
    ChildrenPending,
    /// Ready to aggregate
    FullyConnected,
}

impl fmt::Display for ReactorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReactorState::Stopped => "stopped",
            ReactorState::Started => "started",
            ReactorState::Scanning => "scanning",
            ReactorState::ParentConnecting => "parent_connecting",
            ReactorState::ParentConnected => "parent_connected",
            ReactorState::RootAwaitingIp => "root_awaiting_ip",
            ReactorState::ChildrenPending => "children_pending",
            ReactorState::FullyConnected => "fully_connected",
        };
        f.write_str(name)
    }
}

/// Reactor settings
#[derive(Debug, Clone, Copy)]
pub struct ReactorConfig {
    /// Children the root waits for before it counts as fully connected
    pub max_children: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self { max_children: 8 }
    }
}

/// Consumes mesh events and keeps topology and connection bits current
pub struct EventReactor {
    config: ReactorConfig,
    topology: TopologyManager,
    driver: Arc<dyn ScanDriver>,
    signals: Arc<ConnectionState>,
    children: AtomicUsize,
    state: ReactorState,
}

impl fmt::Debug for EventReactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReactor")
            .field("config", &self.config)
            .field("topology", &self.topology)
            .field("children", &self.children)
            .field("state", &self.state)
            .finish()
    }
}

impl EventReactor {
    /// Create a reactor for a node that has not started yet
    pub fn new(
        config: ReactorConfig,
        topology: TopologyManager,
        driver: Arc<dyn ScanDriver>,
        signals: Arc<ConnectionState>,
    ) -> Self {
        Self {
            config,
            topology,
            driver,
            signals,
            children: AtomicUsize::new(0),
            state: ReactorState::Stopped,
        }
    }

    /// Current state
    pub fn state(&self) -> ReactorState {
        self.state
    }

    /// Topology owned by this reactor
    pub fn topology(&self) -> &TopologyManager {
        &self.topology
    }

    /// Shared connection bits
    pub fn signals(&self) -> Arc<ConnectionState> {
        self.signals.clone()
    }

    /// Children currently counted toward the threshold
    pub fn child_count(&self) -> usize {
        self.children.load(Ordering::Acquire)
    }

    /// Prepare the radio before the stack starts.
    ///
    /// The root aligns with the upstream channel; every node configures its
    /// own mesh soft-AP authentication. Returns the channel to start on.
    pub fn configure(&mut self) -> Result<u8, TopologyError> {
        let channel = if self.topology.is_root() {
            self.topology.discover_channel(self.driver.as_ref())?
        } else {
            self.topology.identity().channel
        };
        self.driver
            .set_ap_auth_mode(self.topology.config().mesh_ap_auth_mode)?;
        info!(
            "Node {} configured on channel {} (mesh {})",
            self.topology.identity().addr,
            channel,
            self.topology.config().mesh_id
        );
        Ok(channel)
    }

    fn transition(&mut self, next: ReactorState) {
        if self.state != next {
            debug!("Reactor {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn restart_scan(&mut self) {
        if let Err(e) = self.topology.restart_passive_scan(self.driver.as_ref()) {
            warn!("Failed to restart passive scan: {}", e);
        }
        self.transition(ReactorState::Scanning);
    }

    fn root_ready_state(&self) -> ReactorState {
        if self.signals.contains(ConnectionBits::CHILDREN_THRESHOLD_MET) {
            ReactorState::FullyConnected
        } else {
            ReactorState::ChildrenPending
        }
    }

    /// Apply one event. Never blocks; radio calls are fire-and-forget.
    pub fn handle_event(&mut self, event: MeshEvent) {
        debug!("Mesh event {}", event.name());

        match event {
            MeshEvent::Started => {
                self.signals.set(ConnectionBits::STARTED);
                self.transition(ReactorState::Started);
                if let Err(e) = self.driver.start_scan(ScanMode::Passive) {
                    warn!("Failed to start passive scan: {}", e);
                }
                self.transition(ReactorState::Scanning);
            }

            MeshEvent::Stopped => {
                self.signals.clear(ConnectionBits::STARTED);
                self.transition(ReactorState::Stopped);
            }

            MeshEvent::ScanDone { count } => {
                match self.topology.handle_scan_done(count, self.driver.as_ref()) {
                    Ok(ScanOutcome::ParentApplied(parent)) => {
                        info!("Connecting to parent {} on channel {}", parent.bssid, parent.channel);
                        self.transition(ReactorState::ParentConnecting);
                    }
                    Ok(ScanOutcome::Rescan) => self.transition(ReactorState::Scanning),
                    Err(e) => {
                        warn!("Scan handling failed: {}", e);
                        self.restart_scan();
                    }
                }
            }

            MeshEvent::ChildConnected { addr } => {
                if !self.topology.is_root() {
                    debug!("Ignoring child {} on a non-root node", addr);
                    return;
                }
                let max = self.config.max_children;
                let previous = self
                    .children
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < max).then_some(n + 1)
                    });
                let count = match previous {
                    Ok(n) => n + 1,
                    Err(n) => n,
                };
                info!("Child {} connected ({}/{})", addr, count, max);
                if count == max {
                    self.signals.set(ConnectionBits::CHILDREN_THRESHOLD_MET);
                    if self.signals.contains(ConnectionBits::ROOT_HAS_IP) {
                        self.transition(ReactorState::FullyConnected);
                    }
                }
            }

            MeshEvent::ChildDisconnected { addr } => {
                if !self.topology.is_root() {
                    return;
                }
                let count = match self
                    .children
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                {
                    Ok(n) => n - 1,
                    Err(n) => n,
                };
                info!("Child {} disconnected ({}/{})", addr, count, self.config.max_children);
                if count < self.config.max_children {
                    self.signals.clear(ConnectionBits::CHILDREN_THRESHOLD_MET);
                    if self.state == ReactorState::FullyConnected {
                        self.transition(ReactorState::ChildrenPending);
                    }
                }
            }

            MeshEvent::ParentConnected { layer } => {
                self.signals.set(ConnectionBits::PARENT_CONNECTED);
                self.transition(ReactorState::ParentConnected);
                info!(
                    "Parent connected as {} at layer {} (stack reports {})",
                    self.topology.role(),
                    self.topology.identity().layer,
                    layer
                );
                match self.topology.role() {
                    NodeRole::Root => {
                        if let Err(e) = self.driver.start_address_acquisition() {
                            error!("Failed to start address acquisition: {}", e);
                        }
                        self.transition(ReactorState::RootAwaitingIp);
                    }
                    _ => self.transition(ReactorState::FullyConnected),
                }
            }

            MeshEvent::ParentDisconnected { reason } => {
                self.signals.clear(ConnectionBits::PARENT_CONNECTED);
                warn!("Parent disconnected: {}", reason);
                if reason.is_capacity() {
                    self.restart_scan();
                } else {
                    self.transition(ReactorState::ParentConnecting);
                }
            }

            MeshEvent::RootGotIp => {
                self.signals.set(ConnectionBits::ROOT_HAS_IP);
                info!("Root received an upstream address");
                let next = self.root_ready_state();
                self.transition(next);
            }

            MeshEvent::RoutingTableAdd { count } => {
                info!("Routing table grew by {}", count);
            }

            MeshEvent::RoutingTableRemove { count } => {
                info!("Routing table shrank by {}", count);
            }

            MeshEvent::NoParentFound => {
                warn!("No parent found, rescanning");
                self.restart_scan();
            }
        }
    }

    /// Drain events until every sender is gone
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<MeshEvent>) -> Self {
        info!("Event reactor running for {}", self.topology.identity().addr);
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        info!("Event reactor shutting down in state {}", self.state);
        self
    }
}

/// Wait for the node to be usable: parent attached and, on the root, an
/// upstream address. Each wait is bounded by `bound` when given.
pub async fn connect(
    signals: &ConnectionState,
    role: NodeRole,
    bound: Option<Duration>,
) -> Result<(), WaitError> {
    signals.wait_bits(ConnectionBits::PARENT_CONNECTED, bound).await?;
    info!("Connected to the mesh");
    if role == NodeRole::Root {
        info!("Root waiting for an upstream address");
        signals.wait_bits(ConnectionBits::ROOT_HAS_IP, bound).await?;
    }
    Ok(())
}

/// Wait on the root until the configured number of children are attached,
/// bounded by `bound` when given.
pub async fn await_children(signals: &ConnectionState, bound: Option<Duration>) -> Result<(), WaitError> {
    info!("Root waiting for its children");
    signals
        .wait_bits(ConnectionBits::CHILDREN_THRESHOLD_MET, bound)
        .await?;
    info!("Children threshold met");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DisconnectReason;
    use mesh_topology::{
        AuthMode, DriverError, MeshAddr, MeshAssoc, MeshId, MeshType, ParentConfig, Password,
        ScanRecord, Ssid, TopologyConfig,
    };
    use std::sync::Mutex;

    const MESH_ID: MeshId = MeshId([0x7A, 0x69, 0xDE, 0xAD, 0xBE, 0xEF]);

    #[derive(Default)]
    struct FakeRadio {
        records: Mutex<Vec<ScanRecord>>,
        scans: AtomicUsize,
        parents: Mutex<Vec<ParentConfig>>,
        dhcp: AtomicUsize,
    }

    impl ScanDriver for FakeRadio {
        fn start_scan(&self, _mode: ScanMode) -> Result<(), DriverError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn stop_scan(&self) -> Result<(), DriverError> {
            Ok(())
        }
        fn scan_records(&self, count: usize) -> Vec<ScanRecord> {
            self.records.lock().unwrap().iter().take(count).cloned().collect()
        }
        fn flush_scan_results(&self) {}
        fn scan_access_points(&self) -> Result<Vec<ScanRecord>, DriverError> {
            Ok(self.records.lock().unwrap().clone())
        }
        fn set_ap_auth_mode(&self, _mode: AuthMode) -> Result<(), DriverError> {
            Ok(())
        }
        fn set_parent(&self, parent: &ParentConfig) -> Result<(), DriverError> {
            self.parents.lock().unwrap().push(parent.clone());
            Ok(())
        }
        fn start_address_acquisition(&self) -> Result<(), DriverError> {
            self.dhcp.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn upstream() -> ScanRecord {
        ScanRecord {
            ssid: Ssid::new("upstream").unwrap(),
            bssid: MeshAddr([0xAA, 0, 0, 0, 0, 1]),
            channel: 6,
            auth_mode: AuthMode::Wpa2Psk,
            assoc: None,
        }
    }

    fn root_ap() -> ScanRecord {
        ScanRecord {
            ssid: Ssid::new("mesh-root").unwrap(),
            bssid: MeshAddr::from_device_id(1000),
            channel: 6,
            auth_mode: AuthMode::Wpa2Psk,
            assoc: Some(MeshAssoc {
                mesh_type: MeshType::Root,
                layer: 1,
                mesh_id: MESH_ID,
            }),
        }
    }

    fn reactor(is_root: bool, max_children: usize) -> (EventReactor, Arc<FakeRadio>) {
        let radio = Arc::new(FakeRadio::default());
        *radio.records.lock().unwrap() = vec![upstream(), root_ap()];
        let topology = TopologyManager::new(TopologyConfig {
            mesh_id: MESH_ID,
            node_addr: MeshAddr::from_device_id(if is_root { 1000 } else { 3 }),
            is_root,
            router_ssid: Ssid::new("upstream").unwrap(),
            router_password: Password::new("router-pass").unwrap(),
            mesh_ap_password: Password::new("mesh-pass").unwrap(),
            mesh_ap_auth_mode: AuthMode::Wpa2Psk,
            max_layer: 2,
            match_mesh_id: true,
        })
        .unwrap();
        let reactor = EventReactor::new(
            ReactorConfig { max_children },
            topology,
            radio.clone(),
            Arc::new(ConnectionState::new()),
        );
        (reactor, radio)
    }

    fn child(n: u16) -> MeshEvent {
        MeshEvent::ChildConnected {
            addr: MeshAddr::from_device_id(n),
        }
    }

    #[test]
    fn test_root_lifecycle() {
        let (mut reactor, radio) = reactor(true, 2);
        assert_eq!(reactor.configure().unwrap(), 6);

        reactor.handle_event(MeshEvent::Started);
        assert_eq!(reactor.state(), ReactorState::Scanning);
        assert!(reactor.signals().contains(ConnectionBits::STARTED));

        reactor.handle_event(MeshEvent::ScanDone { count: 2 });
        assert_eq!(reactor.state(), ReactorState::ParentConnecting);
        assert_eq!(radio.parents.lock().unwrap()[0].role, NodeRole::Root);

        reactor.handle_event(MeshEvent::ParentConnected { layer: 1 });
        assert_eq!(reactor.state(), ReactorState::RootAwaitingIp);
        assert_eq!(radio.dhcp.load(Ordering::SeqCst), 1);

        reactor.handle_event(MeshEvent::RootGotIp);
        assert_eq!(reactor.state(), ReactorState::ChildrenPending);

        reactor.handle_event(child(1));
        reactor.handle_event(child(2));
        assert_eq!(reactor.state(), ReactorState::FullyConnected);

        reactor.handle_event(MeshEvent::Stopped);
        assert_eq!(reactor.state(), ReactorState::Stopped);
        assert!(!reactor.signals().contains(ConnectionBits::STARTED));
    }

    #[test]
    fn test_leaf_connects_directly() {
        let (mut reactor, radio) = reactor(false, 8);
        reactor.handle_event(MeshEvent::Started);
        reactor.handle_event(MeshEvent::ScanDone { count: 2 });
        assert_eq!(radio.parents.lock().unwrap()[0].layer, 2);

        reactor.handle_event(MeshEvent::ParentConnected { layer: 2 });
        assert_eq!(reactor.state(), ReactorState::FullyConnected);
        assert_eq!(radio.dhcp.load(Ordering::SeqCst), 0);
        assert!(reactor.signals().contains(ConnectionBits::PARENT_CONNECTED));
    }

    #[test]
    fn test_threshold_boundary() {
        let (mut reactor, _radio) = reactor(true, 8);
        for n in 1..8 {
            reactor.handle_event(child(n));
        }
        assert_eq!(reactor.child_count(), 7);
        assert!(!reactor.signals().contains(ConnectionBits::CHILDREN_THRESHOLD_MET));

        reactor.handle_event(child(8));
        assert!(reactor.signals().contains(ConnectionBits::CHILDREN_THRESHOLD_MET));

        reactor.handle_event(child(9));
        assert_eq!(reactor.child_count(), 8);

        reactor.handle_event(MeshEvent::ChildDisconnected {
            addr: MeshAddr::from_device_id(8),
        });
        assert_eq!(reactor.child_count(), 7);
        assert!(!reactor.signals().contains(ConnectionBits::CHILDREN_THRESHOLD_MET));
    }

    #[test]
    fn test_leaf_ignores_children() {
        let (mut reactor, _radio) = reactor(false, 1);
        reactor.handle_event(child(1));
        assert_eq!(reactor.child_count(), 0);
        assert!(!reactor.signals().contains(ConnectionBits::CHILDREN_THRESHOLD_MET));
    }

    #[test]
    fn test_parent_disconnect_reasons() {
        let (mut reactor, radio) = reactor(false, 8);
        reactor.handle_event(MeshEvent::Started);
        reactor.handle_event(MeshEvent::ScanDone { count: 2 });
        reactor.handle_event(MeshEvent::ParentConnected { layer: 2 });

        reactor.handle_event(MeshEvent::ParentDisconnected {
            reason: DisconnectReason::BeaconTimeout,
        });
        assert_eq!(reactor.state(), ReactorState::ParentConnecting);
        assert!(!reactor.signals().contains(ConnectionBits::PARENT_CONNECTED));
        let scans = radio.scans.load(Ordering::SeqCst);

        reactor.handle_event(MeshEvent::ParentDisconnected {
            reason: DisconnectReason::AssocTooMany,
        });
        assert_eq!(reactor.state(), ReactorState::Scanning);
        assert_eq!(radio.scans.load(Ordering::SeqCst), scans + 1);
    }

    #[test]
    fn test_failed_scan_stays_scanning() {
        let (mut reactor, radio) = reactor(false, 8);
        radio.records.lock().unwrap().clear();
        reactor.handle_event(MeshEvent::Started);
        reactor.handle_event(MeshEvent::ScanDone { count: 0 });
        assert_eq!(reactor.state(), ReactorState::Scanning);
        assert!(radio.parents.lock().unwrap().is_empty());
        assert_eq!(radio.scans.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let (reactor, _radio) = reactor(false, 8);
        let signals = reactor.signals();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(reactor.run(rx));

        tx.send(MeshEvent::Started).unwrap();
        tx.send(MeshEvent::ScanDone { count: 2 }).unwrap();
        tx.send(MeshEvent::ParentConnected { layer: 2 }).unwrap();

        connect(&signals, NodeRole::Leaf, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        drop(tx);
        let reactor = handle.await.unwrap();
        assert_eq!(reactor.state(), ReactorState::FullyConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_connect_times_out_without_ip() {
        let signals = ConnectionState::new();
        signals.set(ConnectionBits::PARENT_CONNECTED);
        let err = connect(&signals, NodeRole::Root, Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Timeout { bits, .. } if bits == ConnectionBits::ROOT_HAS_IP));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_children_until_threshold() {
        let (reactor, _radio) = reactor(true, 2);
        let signals = reactor.signals();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(reactor.run(rx));

        tx.send(child(1)).unwrap();
        let err = await_children(&signals, Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WaitError::Timeout { bits, .. } if bits == ConnectionBits::CHILDREN_THRESHOLD_MET
        ));

        tx.send(child(2)).unwrap();
        await_children(&signals, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        drop(tx);
        let reactor = handle.await.unwrap();
        assert_eq!(reactor.child_count(), 2);
    }
}
