//! Node identity, role, channel discovery and parent selection for the mesh.
//!
//! This crate forms the two-layer tree: the statically configured root attaches
//! to the upstream access point, every other node attaches to the root's mesh
//! access point. Selection is first-match in scan order, never best-match.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod credentials;
pub mod driver;
pub mod error;
pub mod identity;
pub mod manager;
pub mod scan;

pub use credentials::{AuthMode, Password, Ssid, MAX_PASSWORD_LEN, MAX_SSID_LEN};
pub use driver::{ScanDriver, ScanMode};
pub use error::{DriverError, TopologyError};
pub use identity::{MeshAddr, MeshId, NetworkIdentity, NodeRole, DEFAULT_CHANNEL, ROOT_LAYER};
pub use manager::{ScanOutcome, TopologyConfig, TopologyManager};
pub use scan::{MeshAssoc, MeshType, ParentCandidate, ParentConfig, ScanRecord};
