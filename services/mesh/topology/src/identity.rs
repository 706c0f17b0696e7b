//! Node identity and role.

use crate::TopologyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Layer of the root node
pub const ROOT_LAYER: u8 = 1;

/// Channel used when the upstream access point is not visible
pub const DEFAULT_CHANNEL: u8 = 1;

fn parse_six_bytes(s: &str) -> Result<[u8; 6], TopologyError> {
    let mut out = [0u8; 6];
    let mut parts = s.split(|c| c == ':' || c == '-');
    for byte in out.iter_mut() {
        let part = parts.next().ok_or_else(|| TopologyError::Address(s.to_string()))?;
        *byte = u8::from_str_radix(part.trim(), 16).map_err(|_| TopologyError::Address(s.to_string()))?;
    }
    if parts.next().is_some() {
        return Err(TopologyError::Address(s.to_string()));
    }
    Ok(out)
}

fn write_six_bytes(f: &mut fmt::Formatter<'_>, bytes: &[u8; 6]) -> fmt::Result {
    write!(
        f,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
    )
}

/// 6-byte identifier shared by every node of one mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshId(pub [u8; 6]);

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_six_bytes(f, &self.0)
    }
}

impl FromStr for MeshId {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_six_bytes(s).map(MeshId)
    }
}

/// 6-byte station/soft-AP address of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeshAddr(pub [u8; 6]);

impl MeshAddr {
    /// Derive a locally administered address from a numeric device id
    pub fn from_device_id(device_id: u16) -> Self {
        let [hi, lo] = device_id.to_be_bytes();
        MeshAddr([0x02, 0x00, 0x00, 0x00, hi, lo])
    }
}

impl fmt::Display for MeshAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_six_bytes(f, &self.0)
    }
}

impl FromStr for MeshAddr {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_six_bytes(s).map(MeshAddr)
    }
}

/// Role a node plays in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Bridges the mesh to the collector
    Root,
    /// Talks only to its parent
    Leaf,
    /// No parent selected yet
    Idle,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Root => write!(f, "root"),
            NodeRole::Leaf => write!(f, "leaf"),
            NodeRole::Idle => write!(f, "idle"),
        }
    }
}

/// Where this node sits in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    /// Mesh identifier
    pub mesh_id: MeshId,
    /// Address of this node
    pub addr: MeshAddr,
    /// Wireless channel
    pub channel: u8,
    /// Tree layer, 0 until a parent is selected
    pub layer: u8,
}
