//! One-hop data plane for the IMU mesh.
//!
//! The root addresses each child point-to-point and collects one payload per
//! child in a receive round; a leaf only ever talks to its parent. The
//! [`MeshTransport`] trait is the seam to the radio; [`LoopbackMesh`] wires
//! nodes together in-process.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod loopback;
pub mod plane;
pub mod transport;

pub use error::{DataPlaneError, TransportError};
pub use loopback::{LoopbackMesh, LoopbackPort};
pub use plane::{DataPlane, Slot, Target, PENDING_POLL};
pub use transport::{MeshTransport, RecvMeta, SendFlags};
