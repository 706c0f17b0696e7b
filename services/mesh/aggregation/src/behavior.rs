//! Role-specific halves of one aggregation round.

use crate::error::AggregationError;
use crate::sink::PublishSink;
use async_trait::async_trait;
use mesh_dataplane::{DataPlane, Slot, Target};
use mesh_topology::NodeRole;
use mesh_wire::{encode_fragment, ResponseCode, SensorReading, ThingsDocument, WireError, TX_SIZE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a node does with its readings in one round
#[async_trait]
pub trait RoleBehavior: Send + Sync {
    /// Role this behaviour implements
    fn role(&self) -> NodeRole;

    /// Run one round and return the collector's response code
    async fn aggregate(
        &self,
        plane: &DataPlane,
        readings: &[SensorReading],
    ) -> Result<ResponseCode, AggregationError>;
}

/// Root: gather every child's fragment, publish once, fan the answer out
pub struct RootBehavior {
    sink: Arc<dyn PublishSink>,
}

impl RootBehavior {
    /// Create a root behaviour publishing through `sink`
    pub fn new(sink: Arc<dyn PublishSink>) -> Self {
        Self { sink }
    }

    /// Build the `things` document from local readings and received slots
    pub fn build_document(
        readings: &[SensorReading],
        slots: &[Slot],
    ) -> Result<ThingsDocument, AggregationError> {
        let mut document = ThingsDocument::new();
        for reading in readings {
            document.push_reading(reading)?;
        }

        for (index, slot) in slots.iter().enumerate() {
            match slot {
                Slot::Fragment(fragment) => match document.push_fragment(fragment) {
                    Ok(merged) => debug!("Merged {} things from slot {}", merged, index),
                    Err(e) => warn!("Dropping malformed fragment in slot {}: {}", index, e),
                },
                Slot::NoData => debug!("Slot {} carried no data", index),
            }
        }

        Ok(document)
    }
}

#[async_trait]
impl RoleBehavior for RootBehavior {
    fn role(&self) -> NodeRole {
        NodeRole::Root
    }

    async fn aggregate(
        &self,
        plane: &DataPlane,
        readings: &[SensorReading],
    ) -> Result<ResponseCode, AggregationError> {
        let expected = plane.wait_pending().await?;
        // Every child already has data queued, so the receives do not block
        let slots = plane.receive_round(expected, Some(Duration::ZERO)).await;

        let document = Self::build_document(readings, &slots)?;
        let body = document.to_bytes()?;
        info!(
            "Publishing {} things ({} local, {} slots)",
            document.len(),
            readings.len(),
            slots.len()
        );

        match self.sink.publish(&body).await {
            Ok(code) => {
                let code = ResponseCode::from(code);
                let reached = plane.fan_out(&code.to_payload()).await?;
                info!("Collector answered {}, sent to {} children", code, reached);
                Ok(code)
            }
            Err(e) => {
                error!("Publish failed: {}", e);
                // Release leaves waiting on their response slot
                if let Err(fan) = plane.fan_out(&ResponseCode::Fail.to_payload()).await {
                    warn!("Failed to notify children of publish failure: {}", fan);
                }
                Err(e.into())
            }
        }
    }
}

/// Leaf: send readings to the parent and wait for the relayed response
#[derive(Debug, Default, Clone, Copy)]
pub struct LeafBehavior;

impl LeafBehavior {
    /// Encode the newest readings whose fragment fits one mesh payload.
    ///
    /// Returns the fragment and how many of the oldest readings were left out.
    pub fn fitting_fragment(readings: &[SensorReading]) -> Result<(String, usize), WireError> {
        let mut skipped = 0;
        loop {
            let fragment = encode_fragment(&readings[skipped..])?;
            if fragment.len() <= TX_SIZE || skipped == readings.len() {
                return Ok((fragment, skipped));
            }
            skipped += 1;
        }
    }
}

#[async_trait]
impl RoleBehavior for LeafBehavior {
    fn role(&self) -> NodeRole {
        NodeRole::Leaf
    }

    async fn aggregate(
        &self,
        plane: &DataPlane,
        readings: &[SensorReading],
    ) -> Result<ResponseCode, AggregationError> {
        let (fragment, skipped) = Self::fitting_fragment(readings)?;
        if skipped > 0 {
            warn!(
                "Dropped {} oldest of {} readings to fit {} bytes",
                skipped,
                readings.len(),
                TX_SIZE
            );
        }
        plane.send(fragment.as_bytes(), Target::Parent).await?;
        debug!(
            "Sent {} readings to parent, waiting for response",
            readings.len() - skipped
        );

        let slots = plane.receive_round(1, None).await;
        match slots.into_iter().next() {
            Some(Slot::Fragment(text)) if !text.trim().is_empty() => {
                Ok(ResponseCode::parse(&text)?)
            }
            _ => Err(AggregationError::NoResponse),
        }
    }
}
