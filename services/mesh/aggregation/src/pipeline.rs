//! Sampling and publishing loops.
//!
//! The sampler stores a reading every `sample_interval` into one of two
//! buffers, moving to the other buffer whenever the current one is held by
//! the publisher. The publisher drains one buffer per `publish_interval`,
//! alternating, and reacts to the collector's response code.

use crate::coordinator::AggregationCoordinator;
use crate::error::AggregationError;
use crate::sensor::SensorSource;
use mesh_wire::{ReadingKind, ResponseCode, SensorReading};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Readings kept per buffer; the oldest is dropped beyond this
pub const MAX_BUFFERED_READINGS: usize = 10;

/// Two alternating reading buffers
#[derive(Debug, Default)]
pub struct SampleBuffers {
    slots: [Mutex<VecDeque<SensorReading>>; 2],
}

impl SampleBuffers {
    /// Two empty buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `reading` in buffer `index`, or in the other buffer if `index` is held.
    ///
    /// Returns the buffer that received the reading.
    pub async fn store(&self, index: usize, reading: SensorReading) -> usize {
        let mut index = index % 2;
        let mut buffer = match self.slots[index].try_lock() {
            Ok(buffer) => buffer,
            Err(_) => {
                index = (index + 1) % 2;
                self.slots[index].lock().await
            }
        };

        buffer.push_back(reading);
        while buffer.len() > MAX_BUFFERED_READINGS {
            buffer.pop_front();
        }
        index
    }

    /// Hold buffer `index`
    pub async fn lock(&self, index: usize) -> MutexGuard<'_, VecDeque<SensorReading>> {
        self.slots[index % 2].lock().await
    }

    /// Readings currently held in buffer `index`
    pub async fn len(&self, index: usize) -> usize {
        self.lock(index).await.len()
    }
}

/// Pipeline timing and sensor selection
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Kind sampled every tick
    pub kind: ReadingKind,
    /// Time between samples
    pub sample_interval: Duration,
    /// Time between publish cycles
    pub publish_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            kind: ReadingKind::Quaternion,
            sample_interval: Duration::from_millis(100),
            publish_interval: Duration::from_secs(1),
        }
    }
}

/// Handles of the running sampler and publisher
#[derive(Debug)]
pub struct PipelineHandles {
    /// Sampler task
    pub sampler: JoinHandle<()>,
    /// Publisher task
    pub publisher: JoinHandle<()>,
}

impl PipelineHandles {
    /// Stop both loops
    pub fn abort(&self) {
        self.sampler.abort();
        self.publisher.abort();
    }
}

/// Sampler and publisher for one node
pub struct Pipeline {
    config: PipelineConfig,
    sensor: Arc<dyn SensorSource>,
    coordinator: AggregationCoordinator,
    buffers: SampleBuffers,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline
    pub fn new(
        config: PipelineConfig,
        sensor: Arc<dyn SensorSource>,
        coordinator: AggregationCoordinator,
    ) -> Self {
        Self {
            config,
            sensor,
            coordinator,
            buffers: SampleBuffers::new(),
        }
    }

    /// Sample buffers
    pub fn buffers(&self) -> &SampleBuffers {
        &self.buffers
    }

    /// Coordinator driving each round
    pub fn coordinator(&self) -> &AggregationCoordinator {
        &self.coordinator
    }

    /// Take one reading into buffer `index`; returns the buffer to use next
    pub async fn sample_once(&self, index: usize) -> usize {
        match self.sensor.read(self.config.kind) {
            Ok(reading) => self.buffers.store(index, reading).await,
            Err(e) => {
                warn!("Sensor read failed: {}", e);
                index
            }
        }
    }

    /// Drain buffer `index` through one aggregation round.
    ///
    /// The buffer stays held for the whole round so the sampler moves to the
    /// other one. Returns `None` when the buffer was empty.
    pub async fn publish_cycle(
        &self,
        index: usize,
    ) -> Option<Result<ResponseCode, AggregationError>> {
        let mut buffer = self.buffers.lock(index).await;
        if buffer.is_empty() {
            return None;
        }

        let readings: Vec<SensorReading> = buffer.iter().cloned().collect();
        let result = self.coordinator.aggregate(&readings).await;
        buffer.clear();
        drop(buffer);

        if let Ok(code) = &result {
            if !code.is_ok() {
                self.handle_response(*code).await;
            }
        }
        if let Err(e) = &result {
            error!("Aggregation failed: {}", e);
        }
        Some(result)
    }

    /// React to a non-success response code
    pub async fn handle_response(&self, code: ResponseCode) {
        if let Some(kind) = code.retry_kind() {
            self.resend(kind).await;
            return;
        }
        match code {
            ResponseCode::Ok | ResponseCode::Fail => {
                info!("Collector round complete ({})", code);
            }
            ResponseCode::Resend(_) => {}
            ResponseCode::ConnectFail => warn!("Collector error: couldn't connect to server"),
            ResponseCode::WriteFail => warn!("Collector error: socket error while sending"),
            ResponseCode::NoWifi => warn!("Collector error: not connected to the network"),
            ResponseCode::MqttError => warn!("Collector error: broker error"),
            ResponseCode::Other(n) => warn!("Collector error: unknown code {}", n),
        }
    }

    async fn resend(&self, kind: ReadingKind) {
        info!("Collector asked for {} again", kind);
        let reading = match self.sensor.read(kind) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Re-read of {} failed: {}", kind, e);
                return;
            }
        };
        match self.coordinator.aggregate(&[reading]).await {
            Ok(code) => debug!("Resent {}: collector answered {}", kind, code),
            Err(e) => warn!("Resend of {} failed: {}", kind, e),
        }
    }

    /// Sample forever at `sample_interval`
    pub async fn run_sampler(&self) {
        let mut interval = tokio::time::interval(self.config.sample_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut index = 0;
        loop {
            interval.tick().await;
            index = self.sample_once(index).await;
        }
    }

    /// Publish forever at `publish_interval`, one cycle at a time
    pub async fn run_publisher(&self) {
        let mut interval = tokio::time::interval(self.config.publish_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        let mut index = 0;
        loop {
            interval.tick().await;
            self.publish_cycle(index).await;
            index = (index + 1) % 2;
        }
    }

    /// Spawn the sampler and publisher
    pub fn spawn(self: Arc<Self>) -> PipelineHandles {
        let sampler = {
            let pipeline = self.clone();
            tokio::spawn(async move { pipeline.run_sampler().await })
        };
        let publisher = tokio::spawn(async move { self.run_publisher().await });
        info!("Pipeline started");
        PipelineHandles { sampler, publisher }
    }
}
