//! Topology manager: channel discovery, scan evaluation and parent application.

use crate::credentials::{AuthMode, Password, Ssid};
use crate::driver::{ScanDriver, ScanMode};
use crate::error::TopologyError;
use crate::identity::{MeshAddr, MeshId, NetworkIdentity, NodeRole, DEFAULT_CHANNEL, ROOT_LAYER};
use crate::scan::{MeshType, ParentCandidate, ParentConfig, ScanRecord};
use tracing::{debug, info, warn};

/// Static topology configuration
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    /// Mesh identifier shared by all nodes
    pub mesh_id: MeshId,
    /// This node's address
    pub node_addr: MeshAddr,
    /// Whether this node is the statically configured root
    pub is_root: bool,
    /// Upstream access point name
    pub router_ssid: Ssid,
    /// Upstream access point password
    pub router_password: Password,
    /// Password of every node's mesh soft-AP
    pub mesh_ap_password: Password,
    /// Authentication mode of the mesh soft-AP
    pub mesh_ap_auth_mode: AuthMode,
    /// Deepest layer allowed in the tree (1 or 2)
    pub max_layer: u8,
    /// Match parents on mesh id; when false, any root advertisement is accepted
    pub match_mesh_id: bool,
}

impl TopologyConfig {
    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), TopologyError> {
        if !(1..=2).contains(&self.max_layer) {
            return Err(TopologyError::MaxLayer(self.max_layer));
        }
        Ok(())
    }

    /// Role this node ends up with once attached
    pub fn designated_role(&self) -> NodeRole {
        if self.is_root {
            NodeRole::Root
        } else {
            NodeRole::Leaf
        }
    }
}

/// What a scan-done event led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A parent was selected and committed to the radio
    ParentApplied(ParentConfig),
    /// Nothing matched; a passive scan was restarted
    Rescan,
}

/// Owns node identity and role and drives parent selection
#[derive(Debug)]
pub struct TopologyManager {
    config: TopologyConfig,
    identity: NetworkIdentity,
    role: NodeRole,
}

impl TopologyManager {
    /// Create a manager for an unattached node
    pub fn new(config: TopologyConfig) -> Result<Self, TopologyError> {
        config.validate()?;
        let identity = NetworkIdentity {
            mesh_id: config.mesh_id,
            addr: config.node_addr,
            channel: DEFAULT_CHANNEL,
            layer: 0,
        };
        Ok(Self {
            config,
            identity,
            role: NodeRole::Idle,
        })
    }

    /// Current role
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Current identity
    pub fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }

    /// Static configuration
    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Whether this node is the configured root
    pub fn is_root(&self) -> bool {
        self.config.is_root
    }

    /// Find the upstream access point's channel, or [`DEFAULT_CHANNEL`].
    ///
    /// Only the root aligns with the upstream network this way.
    pub fn discover_channel(&mut self, driver: &dyn ScanDriver) -> Result<u8, TopologyError> {
        let records = driver.scan_access_points()?;
        let channel = records
            .iter()
            .find(|record| record.ssid == self.config.router_ssid)
            .map(|record| record.channel);

        let channel = match channel {
            Some(channel) => {
                info!("Found upstream {} on channel {}", self.config.router_ssid, channel);
                channel
            }
            None => {
                warn!(
                    "Upstream {} not among {} access points, using channel {}",
                    self.config.router_ssid,
                    records.len(),
                    DEFAULT_CHANNEL
                );
                DEFAULT_CHANNEL
            }
        };

        self.identity.channel = channel;
        Ok(channel)
    }

    /// Pick the first acceptable parent in scan order.
    ///
    /// On success the node's role and layer are updated; on failure nothing changes.
    pub fn evaluate_scan_results(&mut self, records: &[ScanRecord]) -> Option<ParentCandidate> {
        let candidate = if self.config.is_root {
            self.find_upstream(records)
        } else {
            self.find_mesh_parent(records)
        }?;

        self.assign_role(candidate.role);
        self.identity.layer = candidate.layer;
        self.identity.channel = candidate.record.channel;

        debug!(
            "Selected parent {} ({}) on channel {}: role {}, layer {}",
            candidate.record.ssid,
            candidate.record.bssid,
            candidate.record.channel,
            candidate.role,
            candidate.layer
        );

        Some(candidate)
    }

    fn find_upstream(&self, records: &[ScanRecord]) -> Option<ParentCandidate> {
        records
            .iter()
            .find(|record| record.assoc.is_none() && record.ssid == self.config.router_ssid)
            .map(|record| ParentCandidate {
                record: record.clone(),
                role: NodeRole::Root,
                layer: ROOT_LAYER,
            })
    }

    fn find_mesh_parent(&self, records: &[ScanRecord]) -> Option<ParentCandidate> {
        records.iter().find_map(|record| {
            let assoc = record.assoc.as_ref()?;
            let matches = if self.config.match_mesh_id {
                assoc.mesh_id == self.config.mesh_id
            } else {
                assoc.mesh_type == MeshType::Root
            };
            if !matches {
                return None;
            }

            let layer = assoc.layer.saturating_add(1);
            if layer > self.config.max_layer {
                debug!("Skipping {}: layer {} exceeds max {}", record.bssid, layer, self.config.max_layer);
                return None;
            }

            Some(ParentCandidate {
                record: record.clone(),
                role: NodeRole::Leaf,
                layer,
            })
        })
    }

    fn assign_role(&mut self, role: NodeRole) {
        match self.role {
            NodeRole::Idle => {
                info!("Node {} takes role {}", self.identity.addr, role);
                self.role = role;
            }
            current if current == role => {}
            current => {
                warn!("Ignoring role change {} -> {}: role is fixed once assigned", current, role);
            }
        }
    }

    /// Commit a candidate to the radio
    pub fn apply_parent(
        &self,
        candidate: &ParentCandidate,
        driver: &dyn ScanDriver,
    ) -> Result<ParentConfig, TopologyError> {
        let record = &candidate.record;
        driver.set_ap_auth_mode(record.auth_mode)?;

        let password = if record.auth_mode.requires_password() {
            Some(match candidate.role {
                NodeRole::Root => self.config.router_password.clone(),
                _ => self.config.mesh_ap_password.clone(),
            })
        } else {
            None
        };

        let parent = ParentConfig {
            ssid: record.ssid.clone(),
            bssid: record.bssid,
            channel: record.channel,
            auth_mode: record.auth_mode,
            password,
            mesh_id: self.config.mesh_id,
            role: candidate.role,
            layer: candidate.layer,
        };

        driver.set_parent(&parent)?;
        info!(
            "Parent {} applied on channel {} as {} at layer {}",
            parent.bssid, parent.channel, parent.role, parent.layer
        );
        Ok(parent)
    }

    /// Restart a passive scan after an unusable result
    pub fn restart_passive_scan(&self, driver: &dyn ScanDriver) -> Result<(), TopologyError> {
        if let Err(e) = driver.stop_scan() {
            debug!("Stopping scan before restart failed: {}", e);
        }
        driver.start_scan(ScanMode::Passive)?;
        Ok(())
    }

    /// Handle a completed scan: select and apply a parent, or rescan
    pub fn handle_scan_done(
        &mut self,
        count: usize,
        driver: &dyn ScanDriver,
    ) -> Result<ScanOutcome, TopologyError> {
        let records = driver.scan_records(count);
        driver.flush_scan_results();

        match self.evaluate_scan_results(&records) {
            Some(candidate) => Ok(ScanOutcome::ParentApplied(self.apply_parent(&candidate, driver)?)),
            None => {
                debug!("{}", TopologyError::NoParentFound(records.len()));
                self.restart_passive_scan(driver)?;
                Ok(ScanOutcome::Rescan)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::scan::MeshAssoc;
    use std::sync::Mutex;

    const MESH_ID: MeshId = MeshId([0x7A, 0x69, 0xDE, 0xAD, 0xBE, 0xEF]);

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        StartScan(ScanMode),
        StopScan,
        Flush,
        AuthMode(AuthMode),
        SetParent(ParentConfig),
    }

    #[derive(Default)]
    struct RecordingDriver {
        records: Vec<ScanRecord>,
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingDriver {
        fn with_records(records: Vec<ScanRecord>) -> Self {
            Self {
                records,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn parents(&self) -> Vec<ParentConfig> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::SetParent(parent) => Some(parent),
                    _ => None,
                })
                .collect()
        }
    }

    impl ScanDriver for RecordingDriver {
        fn start_scan(&self, mode: ScanMode) -> Result<(), DriverError> {
            self.calls.lock().unwrap().push(Call::StartScan(mode));
            Ok(())
        }
        fn stop_scan(&self) -> Result<(), DriverError> {
            self.calls.lock().unwrap().push(Call::StopScan);
            Ok(())
        }
        fn scan_records(&self, count: usize) -> Vec<ScanRecord> {
            self.records.iter().take(count).cloned().collect()
        }
        fn flush_scan_results(&self) {
            self.calls.lock().unwrap().push(Call::Flush);
        }
        fn scan_access_points(&self) -> Result<Vec<ScanRecord>, DriverError> {
            Ok(self.records.clone())
        }
        fn set_ap_auth_mode(&self, mode: AuthMode) -> Result<(), DriverError> {
            self.calls.lock().unwrap().push(Call::AuthMode(mode));
            Ok(())
        }
        fn set_parent(&self, parent: &ParentConfig) -> Result<(), DriverError> {
            self.calls.lock().unwrap().push(Call::SetParent(parent.clone()));
            Ok(())
        }
        fn start_address_acquisition(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn config(is_root: bool) -> TopologyConfig {
        TopologyConfig {
            mesh_id: MESH_ID,
            node_addr: MeshAddr::from_device_id(if is_root { 1000 } else { 7 }),
            is_root,
            router_ssid: Ssid::new("upstream").unwrap(),
            router_password: Password::new("router-pass").unwrap(),
            mesh_ap_password: Password::new("mesh-pass").unwrap(),
            mesh_ap_auth_mode: AuthMode::Wpa2Psk,
            max_layer: 2,
            match_mesh_id: true,
        }
    }

    fn plain_ap(ssid: &str, last: u8, channel: u8) -> ScanRecord {
        ScanRecord {
            ssid: Ssid::new(ssid).unwrap(),
            bssid: MeshAddr([0xAA, 0, 0, 0, 0, last]),
            channel,
            auth_mode: AuthMode::Wpa2Psk,
            assoc: None,
        }
    }

    fn mesh_ap(last: u8, mesh_id: MeshId, mesh_type: MeshType, layer: u8) -> ScanRecord {
        ScanRecord {
            ssid: Ssid::new(format!("mesh-{}", last)).unwrap(),
            bssid: MeshAddr([0xBB, 0, 0, 0, 0, last]),
            channel: 6,
            auth_mode: AuthMode::Wpa2Psk,
            assoc: Some(MeshAssoc {
                mesh_type,
                layer,
                mesh_id,
            }),
        }
    }

    #[test]
    fn test_invalid_max_layer() {
        let mut cfg = config(false);
        cfg.max_layer = 3;
        assert!(matches!(TopologyManager::new(cfg), Err(TopologyError::MaxLayer(3))));
    }

    #[test]
    fn test_discover_channel() {
        let driver = RecordingDriver::with_records(vec![
            plain_ap("coffee", 1, 11),
            plain_ap("upstream", 2, 9),
            plain_ap("upstream", 3, 3),
        ]);
        let mut manager = TopologyManager::new(config(true)).unwrap();
        assert_eq!(manager.discover_channel(&driver).unwrap(), 9);
        assert_eq!(manager.identity().channel, 9);

        let empty = RecordingDriver::default();
        assert_eq!(manager.discover_channel(&empty).unwrap(), DEFAULT_CHANNEL);
    }

    #[test]
    fn test_root_scan_selects_first_upstream() {
        // Root scans 5 access points, the 3rd matches on channel 6
        let driver = RecordingDriver::with_records(vec![
            plain_ap("coffee", 1, 1),
            mesh_ap(2, MESH_ID, MeshType::Root, 1),
            plain_ap("upstream", 3, 6),
            plain_ap("upstream", 4, 11),
            plain_ap("other", 5, 1),
        ]);
        let mut manager = TopologyManager::new(config(true)).unwrap();

        let outcome = manager.handle_scan_done(5, &driver).unwrap();
        let parent = match outcome {
            ScanOutcome::ParentApplied(parent) => parent,
            other => panic!("unexpected outcome {:?}", other),
        };

        assert_eq!(parent.channel, 6);
        assert_eq!(parent.bssid, MeshAddr([0xAA, 0, 0, 0, 0, 3]));
        assert_eq!(parent.role, NodeRole::Root);
        assert_eq!(parent.layer, ROOT_LAYER);
        assert_eq!(parent.password.as_ref().unwrap().expose(), "router-pass");
        assert_eq!(manager.role(), NodeRole::Root);
        assert_eq!(driver.parents().len(), 1);
        assert_eq!(driver.calls()[0], Call::Flush);
    }

    #[test]
    fn test_root_ignores_mesh_ap_with_upstream_name() {
        let mut disguised = mesh_ap(1, MESH_ID, MeshType::Root, 1);
        disguised.ssid = Ssid::new("upstream").unwrap();
        let mut manager = TopologyManager::new(config(true)).unwrap();
        assert!(manager.evaluate_scan_results(&[disguised]).is_none());
        assert_eq!(manager.role(), NodeRole::Idle);
    }

    #[test]
    fn test_leaf_scan_without_match_rescans() {
        // Leaf scans 3 access points, none carry matching association data
        let other_mesh = MeshId([1, 2, 3, 4, 5, 6]);
        let driver = RecordingDriver::with_records(vec![
            plain_ap("upstream", 1, 6),
            mesh_ap(2, other_mesh, MeshType::Root, 1),
            plain_ap("coffee", 3, 1),
        ]);
        let mut manager = TopologyManager::new(config(false)).unwrap();

        assert_eq!(manager.handle_scan_done(3, &driver).unwrap(), ScanOutcome::Rescan);
        assert!(driver.parents().is_empty());
        assert!(driver.calls().contains(&Call::StartScan(ScanMode::Passive)));
        assert_eq!(manager.role(), NodeRole::Idle);
        assert_eq!(manager.identity().layer, 0);
    }

    #[test]
    fn test_leaf_takes_parent_layer_plus_one() {
        let driver = RecordingDriver::with_records(vec![
            plain_ap("upstream", 1, 6),
            mesh_ap(2, MESH_ID, MeshType::Root, 1),
            mesh_ap(3, MESH_ID, MeshType::Root, 1),
        ]);
        let mut manager = TopologyManager::new(config(false)).unwrap();

        let parent = match manager.handle_scan_done(3, &driver).unwrap() {
            ScanOutcome::ParentApplied(parent) => parent,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(parent.bssid, MeshAddr([0xBB, 0, 0, 0, 0, 2]));
        assert_eq!(parent.layer, 2);
        assert_eq!(parent.role, NodeRole::Leaf);
        assert_eq!(parent.password.as_ref().unwrap().expose(), "mesh-pass");
        assert_eq!(manager.identity().layer, 2);
    }

    #[test]
    fn test_leaf_skips_too_deep_parent() {
        let mut manager = TopologyManager::new(config(false)).unwrap();
        let deep = mesh_ap(1, MESH_ID, MeshType::Node, 2);
        let root = mesh_ap(2, MESH_ID, MeshType::Root, 1);

        let candidate = manager.evaluate_scan_results(&[deep, root]).unwrap();
        assert_eq!(candidate.record.bssid, MeshAddr([0xBB, 0, 0, 0, 0, 2]));
    }

    #[test]
    fn test_idless_mode_matches_root_advertisement() {
        let mut cfg = config(false);
        cfg.match_mesh_id = false;
        let mut manager = TopologyManager::new(cfg).unwrap();
        let foreign_root = mesh_ap(1, MeshId([9; 6]), MeshType::Root, 1);
        let node = mesh_ap(2, MESH_ID, MeshType::Node, 1);

        let candidate = manager.evaluate_scan_results(&[node, foreign_root]).unwrap();
        assert_eq!(candidate.record.bssid, MeshAddr([0xBB, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn test_open_parent_has_no_password() {
        let mut open = plain_ap("upstream", 1, 4);
        open.auth_mode = AuthMode::Open;
        let driver = RecordingDriver::with_records(vec![open]);
        let mut manager = TopologyManager::new(config(true)).unwrap();

        manager.handle_scan_done(1, &driver).unwrap();
        let parent = &driver.parents()[0];
        assert!(parent.password.is_none());
        assert!(driver.calls().contains(&Call::AuthMode(AuthMode::Open)));
    }

    #[test]
    fn test_role_fixed_once_assigned() {
        let mut manager = TopologyManager::new(config(false)).unwrap();
        manager
            .evaluate_scan_results(&[mesh_ap(1, MESH_ID, MeshType::Root, 1)])
            .unwrap();
        manager.assign_role(NodeRole::Root);
        assert_eq!(manager.role(), NodeRole::Leaf);
    }
}
