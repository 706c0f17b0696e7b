//! Radio events delivered to the reactor.

use mesh_topology::MeshAddr;
use std::fmt;

/// Why the parent link went down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Parent refused the association: too many stations
    AssocTooMany,
    /// Parent stopped beaconing
    BeaconTimeout,
    /// Authentication was rejected
    AuthFailed,
    /// Any other driver reason code
    Other(u16),
}

impl DisconnectReason {
    /// Whether the parent has no room left, so another parent must be found
    pub fn is_capacity(self) -> bool {
        matches!(self, DisconnectReason::AssocTooMany)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::AssocTooMany => write!(f, "association refused, too many stations"),
            DisconnectReason::BeaconTimeout => write!(f, "beacon timeout"),
            DisconnectReason::AuthFailed => write!(f, "authentication failed"),
            DisconnectReason::Other(code) => write!(f, "reason {}", code),
        }
    }
}

/// Events raised by the radio stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    /// Mesh stack started
    Started,
    /// Mesh stack stopped
    Stopped,
    /// A scan completed with `count` records
    ScanDone {
        /// Number of records found
        count: usize,
    },
    /// A child associated with this node
    ChildConnected {
        /// Child address
        addr: MeshAddr,
    },
    /// A child left this node
    ChildDisconnected {
        /// Child address
        addr: MeshAddr,
    },
    /// Attached to the selected parent
    ParentConnected {
        /// Layer reported by the stack
        layer: u8,
    },
    /// Lost the parent
    ParentDisconnected {
        /// Driver reason
        reason: DisconnectReason,
    },
    /// Root received an upstream address
    RootGotIp,
    /// Descendants joined the routing table
    RoutingTableAdd {
        /// Entries added
        count: usize,
    },
    /// Descendants left the routing table
    RoutingTableRemove {
        /// Entries removed
        count: usize,
    },
    /// The stack gave up finding a parent on its own
    NoParentFound,
}

impl MeshEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            MeshEvent::Started => "started",
            MeshEvent::Stopped => "stopped",
            MeshEvent::ScanDone { .. } => "scan_done",
            MeshEvent::ChildConnected { .. } => "child_connected",
            MeshEvent::ChildDisconnected { .. } => "child_disconnected",
            MeshEvent::ParentConnected { .. } => "parent_connected",
            MeshEvent::ParentDisconnected { .. } => "parent_disconnected",
            MeshEvent::RootGotIp => "root_got_ip",
            MeshEvent::RoutingTableAdd { .. } => "routing_table_add",
            MeshEvent::RoutingTableRemove { .. } => "routing_table_remove",
            MeshEvent::NoParentFound => "no_parent_found",
        }
    }
}
