//! One simulated sensor node: radio, event reactor, data plane and pipeline.

use crate::config::NodeConfig;
use crate::sim::{SimAir, SimRadio, SimulatedImu};
use crate::{component_info, component_warn};
use anyhow::{Context, Result};
use mesh_aggregation::{AggregationCoordinator, Pipeline, PipelineHandles, PublishSink};
use mesh_dataplane::DataPlane;
use mesh_reactor::{await_children, connect, ConnectionState, EventReactor, ReactorConfig, WaitError};
use mesh_topology::{NodeRole, TopologyManager};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A node that joined the mesh and is sampling
pub struct RunningNode {
    name: String,
    role: NodeRole,
    radio: Arc<SimRadio>,
    reactor: JoinHandle<EventReactor>,
    pipeline: PipelineHandles,
}

impl RunningNode {
    /// Bring a node up on `air` and wait until it is connected
    pub async fn launch(
        config: &NodeConfig,
        air: &Arc<SimAir>,
        sink: Arc<dyn PublishSink>,
    ) -> Result<Self> {
        let name = config.device_id.to_string();
        let topology_config = config.topology_config()?;
        let role = topology_config.designated_role();
        let addr = topology_config.node_addr;

        let (events, events_rx) = mpsc::unbounded_channel();
        let radio = Arc::new(air.radio(addr, events));
        let signals = Arc::new(ConnectionState::new());

        let mut reactor = EventReactor::new(
            ReactorConfig {
                max_children: config.max_children,
            },
            TopologyManager::new(topology_config)?,
            radio.clone(),
            signals.clone(),
        );
        let channel = reactor.configure()?;
        component_info!(
            name.as_str(),
            "Starting {} {} at {} on channel {}",
            role,
            addr,
            config.location,
            channel
        );

        let port = air.hub().attach(addr);
        let reactor = tokio::spawn(reactor.run(events_rx));
        radio.start();

        if let Err(e) = connect(&signals, role, config.connect_timeout).await {
            reactor.abort();
            return Err(e).with_context(|| format!("node {} failed to join the mesh", name));
        }
        component_info!(name.as_str(), "Joined the mesh as {}", role);

        if role == NodeRole::Root && config.max_children > 0 {
            match await_children(&signals, config.children_timeout).await {
                Ok(()) => component_info!(name.as_str(), "All {} children attached", config.max_children),
                Err(WaitError::Timeout { waited, .. }) => component_warn!(
                    name.as_str(),
                    "Starting with fewer than {} children after {:?}",
                    config.max_children,
                    waited
                ),
                Err(e) => {
                    reactor.abort();
                    return Err(e).with_context(|| format!("node {} lost its connection state", name));
                }
            }
        }

        let plane = DataPlane::new(Arc::new(port), role).with_pending_bound(config.pending_timeout);
        let coordinator = AggregationCoordinator::for_role(plane, signals, sink);
        let pipeline = Arc::new(Pipeline::new(
            config.pipeline_config(),
            Arc::new(SimulatedImu::new(config.location)),
            coordinator,
        ))
        .spawn();

        Ok(Self {
            name,
            role,
            radio,
            reactor,
            pipeline,
        })
    }

    /// Node name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role the node joined with
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Stop sampling, leave the mesh and stop the reactor
    pub async fn shutdown(self) {
        self.pipeline.abort();
        self.radio.stop();
        // Let the reactor see the stop before it goes away
        tokio::task::yield_now().await;
        self.reactor.abort();
        match self.reactor.await {
            Ok(reactor) => component_info!(self.name.as_str(), "Reactor ended in {}", reactor.state()),
            Err(e) if e.is_cancelled() => component_info!(self.name.as_str(), "Node stopped"),
            Err(e) => component_warn!(self.name.as_str(), "Reactor task failed: {}", e),
        }
    }
}
