//! In-process radio and IMU used to run a whole body mesh on one host.
//!
//! [`SimAir`] is the shared medium: it advertises the upstream access point
//! and every root soft-AP, routes mesh events between radios and owns the
//! loopback hub carrying data-plane traffic. Each node drives the air through
//! its own [`SimRadio`].

use dashmap::DashMap;
use mesh_aggregation::{SensorError, SensorSource};
use mesh_dataplane::LoopbackMesh;
use mesh_reactor::{DisconnectReason, MeshEvent};
use mesh_topology::{
    AuthMode, DriverError, MeshAddr, MeshAssoc, MeshType, NodeRole, ParentConfig, ScanDriver,
    ScanMode, ScanRecord, Ssid, ROOT_LAYER,
};
use mesh_wire::{BodyLocation, ReadingKind, SensorReading};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Channel the simulated upstream access point sits on
pub const UPSTREAM_CHANNEL: u8 = 6;

/// Delay before a simulated radio reports the outcome of an operation
pub const RADIO_LATENCY: Duration = Duration::from_millis(20);

const GRAVITY: f64 = 9.81;

/// Shared medium connecting simulated radios
#[derive(Debug)]
pub struct SimAir {
    upstream: ScanRecord,
    mesh_aps: DashMap<MeshAddr, ScanRecord>,
    radios: DashMap<MeshAddr, mpsc::UnboundedSender<MeshEvent>>,
    hub: Arc<LoopbackMesh>,
    max_connections: usize,
    latency: Duration,
}

impl SimAir {
    /// Air with one upstream access point named `router_ssid`
    pub fn new(router_ssid: Ssid, max_connections: usize) -> Arc<Self> {
        Arc::new(Self {
            upstream: ScanRecord {
                ssid: router_ssid,
                bssid: MeshAddr([0x02, 0xAA, 0x00, 0x00, 0x00, 0x01]),
                channel: UPSTREAM_CHANNEL,
                auth_mode: AuthMode::Wpa2Psk,
                assoc: None,
            },
            mesh_aps: DashMap::new(),
            radios: DashMap::new(),
            hub: LoopbackMesh::new(),
            max_connections,
            latency: RADIO_LATENCY,
        })
    }

    /// Loopback hub carrying data-plane traffic
    pub fn hub(&self) -> &Arc<LoopbackMesh> {
        &self.hub
    }

    /// Create a radio for `addr` delivering its events to `events`
    pub fn radio(
        self: &Arc<Self>,
        addr: MeshAddr,
        events: mpsc::UnboundedSender<MeshEvent>,
    ) -> SimRadio {
        self.radios.insert(addr, events.clone());
        SimRadio {
            addr,
            air: self.clone(),
            events,
            ap_auth_mode: Mutex::new(AuthMode::Open),
            parent: Mutex::new(None),
        }
    }

    /// Everything `observer` can hear, upstream first then soft-APs by address
    fn visible(&self, observer: MeshAddr) -> Vec<ScanRecord> {
        let mut aps: Vec<ScanRecord> = self
            .mesh_aps
            .iter()
            .filter(|entry| *entry.key() != observer)
            .map(|entry| entry.value().clone())
            .collect();
        aps.sort_by_key(|record| record.bssid);

        let mut records = Vec::with_capacity(aps.len() + 1);
        records.push(self.upstream.clone());
        records.extend(aps);
        records
    }

    fn emit(&self, to: MeshAddr, event: MeshEvent) {
        let Some(tx) = self.radios.get(&to).map(|entry| entry.clone()) else {
            debug!("No radio at {} for {}", to, event.name());
            return;
        };
        let latency = self.latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            // The reactor may already be gone during shutdown
            let _ = tx.send(event);
        });
    }
}

/// One node's radio on a [`SimAir`]
#[derive(Debug)]
pub struct SimRadio {
    addr: MeshAddr,
    air: Arc<SimAir>,
    events: mpsc::UnboundedSender<MeshEvent>,
    ap_auth_mode: Mutex<AuthMode>,
    parent: Mutex<Option<MeshAddr>>,
}

impl SimRadio {
    /// Start the mesh stack
    pub fn start(&self) {
        self.send(MeshEvent::Started);
    }

    /// Stop the mesh stack and leave the air
    pub fn stop(&self) {
        self.air.mesh_aps.remove(&self.addr);
        self.air.hub.unlink(self.addr);
        let parent = self.parent.lock().ok().and_then(|mut parent| parent.take());
        if let Some(parent) = parent {
            self.air
                .emit(parent, MeshEvent::ChildDisconnected { addr: self.addr });
            self.air
                .emit(parent, MeshEvent::RoutingTableRemove { count: 1 });
        }
        self.send(MeshEvent::Stopped);
    }

    fn send(&self, event: MeshEvent) {
        if self.events.send(event).is_err() {
            debug!("Reactor for {} is gone", self.addr);
        }
    }

    fn advertise_root(&self, parent: &ParentConfig) -> Result<(), DriverError> {
        let ssid = Ssid::new(format!("MESH_{}", parent.mesh_id))
            .map_err(|e| DriverError::new(-1, e.to_string()))?;
        let auth_mode = *self
            .ap_auth_mode
            .lock()
            .map_err(|_| DriverError::new(-1, "auth mode lock poisoned"))?;

        self.air.mesh_aps.insert(
            self.addr,
            ScanRecord {
                ssid,
                bssid: self.addr,
                channel: parent.channel,
                auth_mode,
                assoc: Some(MeshAssoc {
                    mesh_type: MeshType::Root,
                    layer: ROOT_LAYER,
                    mesh_id: parent.mesh_id,
                }),
            },
        );
        info!("Root {} advertising mesh AP on channel {}", self.addr, parent.channel);
        Ok(())
    }

    fn join_mesh_parent(&self, parent: &ParentConfig) {
        let children = self.air.hub.children_of(parent.bssid);
        if !children.contains(&self.addr) && children.len() >= self.air.max_connections {
            warn!("Parent {} is full, association refused", parent.bssid);
            self.air.emit(
                self.addr,
                MeshEvent::ParentDisconnected {
                    reason: DisconnectReason::AssocTooMany,
                },
            );
            return;
        }

        self.air.hub.link(self.addr, parent.bssid);
        if let Ok(mut current) = self.parent.lock() {
            *current = Some(parent.bssid);
        }
        self.air
            .emit(parent.bssid, MeshEvent::ChildConnected { addr: self.addr });
        self.air
            .emit(parent.bssid, MeshEvent::RoutingTableAdd { count: 1 });
        self.air.emit(
            self.addr,
            MeshEvent::ParentConnected {
                layer: parent.layer,
            },
        );
    }
}

impl ScanDriver for SimRadio {
    fn start_scan(&self, mode: ScanMode) -> Result<(), DriverError> {
        let count = self.air.visible(self.addr).len();
        debug!("{} {:?} scan sees {} access points", self.addr, mode, count);
        self.air.emit(self.addr, MeshEvent::ScanDone { count });
        Ok(())
    }

    fn stop_scan(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn scan_records(&self, count: usize) -> Vec<ScanRecord> {
        let mut records = self.air.visible(self.addr);
        records.truncate(count);
        records
    }

    fn flush_scan_results(&self) {}

    fn scan_access_points(&self) -> Result<Vec<ScanRecord>, DriverError> {
        Ok(self.air.visible(self.addr))
    }

    fn set_ap_auth_mode(&self, mode: AuthMode) -> Result<(), DriverError> {
        let mut current = self
            .ap_auth_mode
            .lock()
            .map_err(|_| DriverError::new(-1, "auth mode lock poisoned"))?;
        *current = mode;
        Ok(())
    }

    fn set_parent(&self, parent: &ParentConfig) -> Result<(), DriverError> {
        match parent.role {
            NodeRole::Root => {
                self.advertise_root(parent)?;
                self.air.emit(
                    self.addr,
                    MeshEvent::ParentConnected {
                        layer: parent.layer,
                    },
                );
            }
            _ => self.join_mesh_parent(parent),
        }
        Ok(())
    }

    fn start_address_acquisition(&self) -> Result<(), DriverError> {
        self.air.emit(self.addr, MeshEvent::RootGotIp);
        Ok(())
    }
}

/// IMU producing plausible noisy readings
#[derive(Debug)]
pub struct SimulatedImu {
    body: BodyLocation,
    boot: Instant,
}

impl SimulatedImu {
    /// IMU worn at `body`
    pub fn new(body: BodyLocation) -> Self {
        Self {
            body,
            boot: Instant::now(),
        }
    }

    fn ticks(&self) -> u64 {
        u64::try_from(self.boot.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl SensorSource for SimulatedImu {
    fn read(&self, kind: ReadingKind) -> Result<SensorReading, SensorError> {
        let mut rng = rand::thread_rng();
        let mut noise = |scale: f64| rng.gen_range(-scale..=scale);
        let ticks = self.ticks();

        let (x, y, z) = match kind {
            ReadingKind::Quaternion => {
                let (w, x, y, z) = (1.0 + noise(0.05), noise(0.1), noise(0.1), noise(0.1));
                let norm = (w * w + x * x + y * y + z * z).sqrt();
                return Ok(SensorReading::quaternion(
                    self.body,
                    ticks,
                    w / norm,
                    x / norm,
                    y / norm,
                    z / norm,
                ));
            }
            ReadingKind::Accel => (noise(0.3), noise(0.3), GRAVITY + noise(0.3)),
            ReadingKind::Gravity => (noise(0.05), noise(0.05), GRAVITY),
            ReadingKind::LinearAccel | ReadingKind::Gyro => (noise(0.3), noise(0.3), noise(0.3)),
            ReadingKind::Mag => (22.0 + noise(1.0), noise(1.0), -42.0 + noise(1.0)),
            ReadingKind::Euler => (180.0 + noise(180.0), noise(10.0), noise(10.0)),
        };
        Ok(SensorReading::vector(kind, self.body, ticks, x, y, z))
    }
}
