//! Body-worn IMU mesh node binary.
//!
//! Runs the statically configured root and a set of leaves in one process
//! over a simulated radio. The root posts each merged document to the
//! collector, or logs it when running standalone.

use anyhow::Context;
use clap::Parser;
use mesh_aggregation::{HttpPublishSink, LoggingSink, PublishSink};
use mesh_topology::Ssid;
use mesh_wire::BodyLocation;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod node;
mod sim;

use config::{NodeConfig, ROOT_DEVICE_ID};
use logging::NodeLogFormatter;
use node::RunningNode;
use sim::SimAir;

/// Body-worn IMU sensor mesh
#[derive(Parser, Debug)]
#[command(name = "imu-mesh", version, about = "Body-worn IMU sensor mesh node")]
struct Args {
    /// Path to the shared YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Leaves to run alongside the root
    #[arg(long, default_value_t = 2)]
    leaves: usize,

    /// Collector as host:port, or "standalone"
    #[arg(long)]
    collector: Option<String>,

    /// Bound on each connection wait, e.g. 30s
    #[arg(long)]
    connect_timeout: Option<humantime::Duration>,
}

/// Wearing positions handed to simulated leaves, chest excluded
fn leaf_location(index: usize) -> BodyLocation {
    let code = (index % 8) as u8 + 1;
    BodyLocation::try_from(code).unwrap_or(BodyLocation::LeftShin)
}

/// Root first, then the configured leaf if any, then generated leaves
fn node_configs(config: &NodeConfig, leaves: usize) -> Vec<NodeConfig> {
    let root = if config.is_root() {
        config.clone()
    } else {
        NodeConfig {
            device_id: ROOT_DEVICE_ID,
            location: BodyLocation::Chest,
            ..config.clone()
        }
    };

    let mut nodes = vec![root];
    if !config.is_root() {
        nodes.push(config.clone());
    }

    let mut device_id = 1u16;
    while nodes.len() < leaves + 1 {
        if nodes.iter().all(|node| node.device_id != device_id) {
            nodes.push(NodeConfig {
                device_id,
                location: leaf_location(nodes.len() - 1),
                ..config.clone()
            });
        }
        device_id += 1;
    }
    nodes
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("imu_mesh={}", args.log_level).parse()?)
        .add_directive(format!("mesh_wire={}", args.log_level).parse()?)
        .add_directive(format!("mesh_topology={}", args.log_level).parse()?)
        .add_directive(format!("mesh_reactor={}", args.log_level).parse()?)
        .add_directive(format!("mesh_dataplane={}", args.log_level).parse()?)
        .add_directive(format!("mesh_aggregation={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(NodeLogFormatter::new("imu-mesh"))
        .init();

    info!("Starting IMU mesh node v{}", env!("CARGO_PKG_VERSION"));

    let mut config = NodeConfig::load_from_file(&args.config)?;
    if let Some(collector) = args.collector {
        config.collector = collector;
    }
    if let Some(timeout) = args.connect_timeout {
        config.connect_timeout = Some(Duration::from(timeout));
    }

    let sink: Arc<dyn PublishSink> = match config.collector_endpoint()? {
        Some(endpoint) => {
            info!("Publishing to collector {}", endpoint);
            Arc::new(HttpPublishSink::new(endpoint))
        }
        None => {
            info!("No collector configured, documents are logged");
            Arc::new(LoggingSink::default())
        }
    };

    let router_ssid = Ssid::new(config.router_ssid.as_str()).context("router_ssid")?;
    let air = SimAir::new(router_ssid, config.max_children);
    if args.leaves < config.max_children {
        info!(
            "Root waits for {} children instead of {}",
            args.leaves, config.max_children
        );
        config.max_children = args.leaves;
    }

    // The root finishes launching only once its children are attached
    let launches: Vec<_> = node_configs(&config, args.leaves)
        .into_iter()
        .map(|node| {
            let air = air.clone();
            let sink = sink.clone();
            tokio::spawn(async move {
                let result = RunningNode::launch(&node, &air, sink).await;
                (node, result)
            })
        })
        .collect();

    let mut running = Vec::new();
    for launch in launches {
        let (node, result) = launch.await.context("node launch task failed")?;
        match result {
            Ok(node) => {
                component_info!("sim", "Node {} running as {}", node.name(), node.role());
                running.push(node);
            }
            Err(e) => {
                // Without the root nothing can publish
                if node.is_root() {
                    return Err(e);
                }
                component_warn!("sim", "Node {} not started: {:#}", node.device_id, e);
            }
        }
    }
    component_info!("sim", "{} nodes running", running.len());

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGINT handler: {}", e))?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }

    // Leaves leave before the root
    while let Some(node) = running.pop() {
        node.shutdown().await;
    }
    if !air.hub().children_of(mesh_topology::MeshAddr::from_device_id(ROOT_DEVICE_ID)).is_empty() {
        warn!("Some leaves were still linked to the root at shutdown");
    }

    info!("IMU mesh node shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_configs_for_root() {
        let nodes = node_configs(&NodeConfig::default(), 3);
        let ids: Vec<u16> = nodes.iter().map(|node| node.device_id).collect();
        assert_eq!(ids, vec![ROOT_DEVICE_ID, 1, 2, 3]);
        assert_eq!(nodes[0].location, BodyLocation::Chest);
        assert_eq!(nodes[1].location, BodyLocation::RightArmUpper);
        assert_eq!(nodes[3].location, BodyLocation::RightArmLower);
    }

    #[test]
    fn test_node_configs_for_leaf() {
        let config = NodeConfig {
            device_id: 2,
            location: BodyLocation::LeftThigh,
            ..NodeConfig::default()
        };
        let nodes = node_configs(&config, 2);
        let ids: Vec<u16> = nodes.iter().map(|node| node.device_id).collect();
        assert_eq!(ids, vec![ROOT_DEVICE_ID, 2, 1]);
        assert_eq!(nodes[1].location, BodyLocation::LeftThigh);
        assert_eq!(node_configs(&config, 0).len(), 2);
    }

    #[test]
    fn test_leaf_location_skips_chest() {
        for index in 0..16 {
            assert_ne!(leaf_location(index), BodyLocation::Chest);
        }
    }
}
