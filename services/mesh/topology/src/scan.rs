//! Scan records and the parent candidate built from them.

use crate::credentials::{AuthMode, Password, Ssid};
use crate::identity::{MeshAddr, MeshId, NodeRole};

/// Mesh role advertised in an association IE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshType {
    /// Advertiser is the root
    Root,
    /// Advertiser is an intermediate node
    Node,
    /// Advertiser is a leaf
    Leaf,
    /// Advertiser has no role yet
    Idle,
}

/// Mesh association information element carried by a mesh soft-AP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshAssoc {
    /// Advertiser's role
    pub mesh_type: MeshType,
    /// Advertiser's layer
    pub layer: u8,
    /// Mesh the advertiser belongs to
    pub mesh_id: MeshId,
}

/// One access point seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// Advertised name
    pub ssid: Ssid,
    /// Access point address
    pub bssid: MeshAddr,
    /// Primary channel
    pub channel: u8,
    /// Authentication mode
    pub auth_mode: AuthMode,
    /// Mesh association IE, absent for plain access points
    pub assoc: Option<MeshAssoc>,
}

/// Result of a successful scan evaluation; consumed by `apply_parent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentCandidate {
    /// Selected record
    pub record: ScanRecord,
    /// Role this node takes by attaching to it
    pub role: NodeRole,
    /// Layer this node takes by attaching to it
    pub layer: u8,
}

/// Parent configuration committed to the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentConfig {
    /// Parent SSID
    pub ssid: Ssid,
    /// Parent address
    pub bssid: MeshAddr,
    /// Channel to join on
    pub channel: u8,
    /// Parent authentication mode
    pub auth_mode: AuthMode,
    /// Password, absent for open networks
    pub password: Option<Password>,
    /// Mesh identifier
    pub mesh_id: MeshId,
    /// Role this node assumes
    pub role: NodeRole,
    /// Layer this node assumes
    pub layer: u8,
}
