//! Configuration handling for the sensor node.
//!
//! Values come from the shared YAML config file (the `services.node.config`
//! key map) and are then overridden by environment variables.

use anyhow::{anyhow, Context, Result};
use mesh_aggregation::PipelineConfig;
use mesh_topology::{AuthMode, MeshAddr, MeshId, Password, Ssid, TopologyConfig};
use mesh_wire::{BodyLocation, CollectorEndpoint, ReadingKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Device id of the statically configured root
pub const ROOT_DEVICE_ID: u16 = 1000;

/// Collector value meaning "log documents instead of posting them"
pub const STANDALONE: &str = "standalone";

/// Sensor node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Numeric device id; [`ROOT_DEVICE_ID`] makes the node the root
    pub device_id: u16,
    /// Where the node is worn
    pub location: BodyLocation,
    /// Mesh identifier, six hex bytes
    pub mesh_id: String,
    /// Upstream access point name
    pub router_ssid: String,
    /// Upstream access point password
    pub router_password: String,
    /// Password of the mesh soft-AP
    pub mesh_ap_password: String,
    /// Authentication mode of the mesh soft-AP
    pub auth_mode: AuthMode,
    /// Children the root waits for
    pub max_children: usize,
    /// Deepest tree layer (1 or 2)
    pub max_layer: u8,
    /// Collector as `host:port`, or `standalone`
    pub collector: String,
    /// Kind sampled every tick
    pub sensor_kind: ReadingKind,
    /// Time between samples
    pub sample_interval: Duration,
    /// Time between publish cycles
    pub publish_interval: Duration,
    /// Bound on each connection wait; unbounded when absent
    pub connect_timeout: Option<Duration>,
    /// Bound on the root's wait for child data; unbounded when absent
    pub pending_timeout: Option<Duration>,
    /// Bound on the root's wait for `max_children` children; unbounded when absent
    pub children_timeout: Option<Duration>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: ROOT_DEVICE_ID,
            location: BodyLocation::Chest,
            mesh_id: "7A:69:DE:AD:BE:EF".to_string(),
            router_ssid: "imu-collector".to_string(),
            router_password: "collector-pass".to_string(),
            mesh_ap_password: "mesh-ap-pass".to_string(),
            auth_mode: AuthMode::Wpa2Psk,
            max_children: 8,
            max_layer: 2,
            collector: STANDALONE.to_string(),
            sensor_kind: ReadingKind::Quaternion,
            sample_interval: Duration::from_millis(100),
            publish_interval: Duration::from_secs(1),
            connect_timeout: None,
            pending_timeout: None,
            children_timeout: None,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    node: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    config: Option<HashMap<String, String>>,
}

fn parse_auth_mode(value: &str) -> Option<AuthMode> {
    serde_yaml::from_str(value).ok()
}

fn parse_optional_duration(value: &str) -> Option<Option<Duration>> {
    match value {
        "" | "none" => Some(None),
        other => humantime::parse_duration(other).ok().map(Some),
    }
}

impl NodeConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            if let Ok(root_config) = serde_yaml::from_str::<RootConfig>(&content) {
                config.apply_root_config(root_config);
                info!("Loaded configuration from {:?}", config_path.as_ref());
            } else {
                warn!("Failed to parse config file {:?}, using defaults", config_path.as_ref());
            }
        } else {
            warn!("Config file {:?} not found, using defaults", config_path.as_ref());
        }

        config.apply_environment_overrides();

        info!(
            "Final node configuration: device_id={}, location={}, collector={}, max_children={}",
            config.device_id, config.location, config.collector, config.max_children
        );

        Ok(config)
    }

    fn apply_root_config(&mut self, root_config: RootConfig) {
        let config_map = root_config
            .services
            .and_then(|services| services.node)
            .and_then(|node| node.config);

        if let Some(config_map) = config_map {
            for (key, value) in config_map {
                self.apply_key(&key, value);
            }
        }
    }

    fn apply_key(&mut self, key: &str, value: String) {
        let applied = match key {
            "services.node.device_id" => value.parse::<u16>().map(|id| self.device_id = id).is_ok(),
            "services.node.location" => value.parse::<BodyLocation>().map(|loc| self.location = loc).is_ok(),
            "services.node.mesh_id" => {
                self.mesh_id = value.clone();
                true
            }
            "services.node.router_ssid" => {
                self.router_ssid = value.clone();
                true
            }
            "services.node.router_password" => {
                self.router_password = value.clone();
                true
            }
            "services.node.mesh_ap_password" => {
                self.mesh_ap_password = value.clone();
                true
            }
            "services.node.auth_mode" => parse_auth_mode(&value)
                .map(|mode| self.auth_mode = mode)
                .is_some(),
            "services.node.max_children" => {
                value.parse::<usize>().map(|n| self.max_children = n).is_ok()
            }
            "services.node.max_layer" => value.parse::<u8>().map(|n| self.max_layer = n).is_ok(),
            "services.node.collector" => {
                self.collector = value.clone();
                true
            }
            "services.node.sensor_kind" => {
                value.parse::<ReadingKind>().map(|kind| self.sensor_kind = kind).is_ok()
            }
            "services.node.sample_interval" => humantime::parse_duration(&value)
                .map(|d| self.sample_interval = d)
                .is_ok(),
            "services.node.publish_interval" => humantime::parse_duration(&value)
                .map(|d| self.publish_interval = d)
                .is_ok(),
            "services.node.connect_timeout" => parse_optional_duration(&value)
                .map(|d| self.connect_timeout = d)
                .is_some(),
            "services.node.pending_timeout" => parse_optional_duration(&value)
                .map(|d| self.pending_timeout = d)
                .is_some(),
            "services.node.children_timeout" => parse_optional_duration(&value)
                .map(|d| self.children_timeout = d)
                .is_some(),
            // Unknown keys are ignored
            _ => true,
        };

        if !applied {
            warn!("Ignoring invalid value {:?} for {}", value, key);
        }
    }

    fn apply_environment_overrides(&mut self) {
        if let Ok(device_id) = std::env::var("MESH_DEVICE_ID") {
            if let Ok(id) = device_id.parse::<u16>() {
                self.device_id = id;
                info!("Device ID overridden by environment: {}", id);
            }
        }

        if let Ok(location) = std::env::var("MESH_LOCATION") {
            if let Ok(location) = location.parse::<BodyLocation>() {
                self.location = location;
                info!("Location overridden by environment: {}", location);
            }
        }

        if let Ok(ssid) = std::env::var("MESH_ROUTER_SSID") {
            self.router_ssid = ssid;
            info!("Router SSID overridden by environment: {}", self.router_ssid);
        }

        if let Ok(password) = std::env::var("MESH_ROUTER_PASSWORD") {
            self.router_password = password;
            info!("Router password overridden by environment");
        }

        if let Ok(password) = std::env::var("MESH_AP_PASSWORD") {
            self.mesh_ap_password = password;
            info!("Mesh AP password overridden by environment");
        }

        if let Ok(collector) = std::env::var("MESH_COLLECTOR") {
            self.collector = collector;
            info!("Collector overridden by environment: {}", self.collector);
        }
    }

    /// Whether this node is the root
    pub fn is_root(&self) -> bool {
        self.device_id == ROOT_DEVICE_ID
    }

    /// Mesh address derived from the device id
    pub fn node_addr(&self) -> MeshAddr {
        MeshAddr::from_device_id(self.device_id)
    }

    /// Topology settings for this node
    pub fn topology_config(&self) -> Result<TopologyConfig> {
        let mesh_id: MeshId = self
            .mesh_id
            .parse()
            .with_context(|| format!("invalid mesh_id {:?}", self.mesh_id))?;

        let config = TopologyConfig {
            mesh_id,
            node_addr: self.node_addr(),
            is_root: self.is_root(),
            router_ssid: Ssid::new(self.router_ssid.as_str()).context("router_ssid")?,
            router_password: Password::new(self.router_password.as_str())
                .context("router_password")?,
            mesh_ap_password: Password::new(self.mesh_ap_password.as_str())
                .context("mesh_ap_password")?,
            mesh_ap_auth_mode: self.auth_mode,
            max_layer: self.max_layer,
            match_mesh_id: true,
        };
        config.validate()?;
        Ok(config)
    }

    /// Pipeline timing for this node
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            kind: self.sensor_kind,
            sample_interval: self.sample_interval,
            publish_interval: self.publish_interval,
        }
    }

    /// Collector address, or `None` when running standalone
    pub fn collector_endpoint(&self) -> Result<Option<CollectorEndpoint>> {
        parse_collector(&self.collector)
    }
}

/// Parse `host:port` or `standalone`
pub fn parse_collector(value: &str) -> Result<Option<CollectorEndpoint>> {
    if value.eq_ignore_ascii_case(STANDALONE) {
        return Ok(None);
    }

    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("collector {:?} is not host:port", value))?;
    if host.is_empty() {
        return Err(anyhow!("collector {:?} has no host", value));
    }
    let port = port
        .parse::<u16>()
        .with_context(|| format!("collector port {:?} is not a number", port))?;

    Ok(Some(CollectorEndpoint::new(host, port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_topology::NodeRole;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.device_id, ROOT_DEVICE_ID);
        assert!(config.is_root());
        assert_eq!(config.max_children, 8);
        assert_eq!(config.sensor_kind, ReadingKind::Quaternion);
        assert_eq!(config.sample_interval, Duration::from_millis(100));
        assert!(config.connect_timeout.is_none());
        assert!(config.collector_endpoint().unwrap().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
services:
  node:
    enabled: true
    config:
      services.node.device_id: "1004"
      services.node.location: "LeftArmLower"
      services.node.auth_mode: "wpa_psk"
      services.node.max_layer: "1"
      services.node.collector: "10.0.0.5:8080"
      services.node.sensor_kind: "Gyro"
      services.node.publish_interval: "2s"
      services.node.connect_timeout: "30s"
      services.node.children_timeout: "10s"
      services.node.max_children: "lots"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = NodeConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.device_id, 1004);
        assert!(!config.is_root());
        assert_eq!(config.location, BodyLocation::LeftArmLower);
        assert_eq!(config.auth_mode, AuthMode::WpaPsk);
        assert_eq!(config.max_layer, 1);
        assert_eq!(config.sensor_kind, ReadingKind::Gyro);
        assert_eq!(config.publish_interval, Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.children_timeout, Some(Duration::from_secs(10)));
        // Unparseable values keep the default
        assert_eq!(config.max_children, 8);

        let endpoint = config.collector_endpoint().unwrap().unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, 8080);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = NodeConfig::load_from_file("/nonexistent/node.yaml").unwrap();
        assert_eq!(config.mesh_id, NodeConfig::default().mesh_id);
    }

    #[test]
    fn test_parse_collector() {
        assert!(parse_collector("standalone").unwrap().is_none());
        assert!(parse_collector("STANDALONE").unwrap().is_none());
        assert!(parse_collector("collector.local").is_err());
        assert!(parse_collector(":80").is_err());
        assert!(parse_collector("host:http").is_err());
        let endpoint = parse_collector("collector.local:3000").unwrap().unwrap();
        assert_eq!(endpoint.to_string(), "collector.local:3000");
    }

    #[test]
    fn test_topology_config() {
        let config = NodeConfig {
            device_id: 3,
            ..NodeConfig::default()
        };
        let topology = config.topology_config().unwrap();
        assert!(!topology.is_root);
        assert_eq!(topology.designated_role(), NodeRole::Leaf);
        assert_eq!(topology.node_addr, MeshAddr::from_device_id(3));
        assert_eq!(topology.mesh_id.to_string(), "7A:69:DE:AD:BE:EF");
    }

    #[test]
    fn test_topology_config_rejects_long_password() {
        let config = NodeConfig {
            router_password: "p".repeat(65),
            ..NodeConfig::default()
        };
        assert!(config.topology_config().is_err());

        let config = NodeConfig {
            max_layer: 3,
            ..NodeConfig::default()
        };
        assert!(config.topology_config().is_err());
    }
}
