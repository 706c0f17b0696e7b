//! Aggregation entry point shared by both roles.

use crate::behavior::{LeafBehavior, RoleBehavior, RootBehavior};
use crate::error::AggregationError;
use crate::sink::PublishSink;
use mesh_dataplane::DataPlane;
use mesh_reactor::{ConnectionBits, ConnectionState};
use mesh_topology::NodeRole;
use mesh_wire::{ResponseCode, SensorReading};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Runs aggregation rounds for one node
pub struct AggregationCoordinator {
    plane: DataPlane,
    signals: Arc<ConnectionState>,
    behavior: Box<dyn RoleBehavior>,
}

impl fmt::Debug for AggregationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationCoordinator")
            .field("plane", &self.plane)
            .field("role", &self.behavior.role())
            .finish()
    }
}

impl AggregationCoordinator {
    /// Create a coordinator with an explicit behaviour
    pub fn new(
        plane: DataPlane,
        signals: Arc<ConnectionState>,
        behavior: Box<dyn RoleBehavior>,
    ) -> Self {
        Self {
            plane,
            signals,
            behavior,
        }
    }

    /// Create a coordinator whose behaviour follows the data plane's role.
    ///
    /// The sink is only used by the root.
    pub fn for_role(
        plane: DataPlane,
        signals: Arc<ConnectionState>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        let behavior: Box<dyn RoleBehavior> = match plane.role() {
            NodeRole::Root => Box::new(RootBehavior::new(sink)),
            _ => Box::new(LeafBehavior),
        };
        Self::new(plane, signals, behavior)
    }

    /// Role of this node
    pub fn role(&self) -> NodeRole {
        self.behavior.role()
    }

    /// Data plane in use
    pub fn plane(&self) -> &DataPlane {
        &self.plane
    }

    /// Run one round with `readings` as the local contribution
    pub async fn aggregate(
        &self,
        readings: &[SensorReading],
    ) -> Result<ResponseCode, AggregationError> {
        if !self.signals.contains(ConnectionBits::PARENT_CONNECTED) {
            return Err(AggregationError::NoNetwork);
        }
        debug!("Aggregating {} readings as {}", readings.len(), self.role());
        self.behavior.aggregate(&self.plane, readings).await
    }
}
