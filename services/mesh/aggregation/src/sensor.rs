//! Local sensor seam.

use crate::error::SensorError;
use mesh_wire::{ReadingKind, SensorReading};

/// Produces one reading of a given kind on demand
pub trait SensorSource: Send + Sync {
    /// Take one reading
    fn read(&self, kind: ReadingKind) -> Result<SensorReading, SensorError>;
}
