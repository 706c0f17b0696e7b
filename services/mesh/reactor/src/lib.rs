//! Mesh event handling for the IMU mesh.
//!
//! The [`EventReactor`] consumes radio events from an unbounded channel, drives
//! the [`mesh_topology::TopologyManager`] and publishes progress through the
//! [`ConnectionState`] bit set that the sampling pipeline waits on.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mesh_reactor::{connect, ConnectionState, EventReactor, MeshEvent, ReactorConfig};
//! use mesh_topology::{NodeRole, ScanDriver, TopologyManager};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example(topology: TopologyManager, radio: Arc<dyn ScanDriver>) -> anyhow::Result<()> {
//! let signals = Arc::new(ConnectionState::new());
//! let mut reactor = EventReactor::new(ReactorConfig::default(), topology, radio, signals.clone());
//! reactor.configure()?;
//!
//! let (events, rx) = mpsc::unbounded_channel();
//! tokio::spawn(reactor.run(rx));
//! events.send(MeshEvent::Started)?;
//!
//! connect(&signals, NodeRole::Leaf, None).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod reactor;
pub mod state;

pub use event::{DisconnectReason, MeshEvent};
pub use reactor::{await_children, connect, EventReactor, ReactorConfig, ReactorState};
pub use state::{ConnectionBits, ConnectionState, WaitError, WAIT_TICK};
