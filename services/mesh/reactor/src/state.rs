//! Connection signal set shared between the reactor and the pipeline.
//!
//! The reactor sets and clears bits as radio events arrive; the pipeline waits
//! on them. Waits are bounded polls of [`WAIT_TICK`] repeated until the bits
//! appear or an optional overall bound runs out.

use bitflags::bitflags;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Length of one wait poll
pub const WAIT_TICK: Duration = Duration::from_millis(500);

bitflags! {
    /// Connection milestones
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConnectionBits: u32 {
        /// Mesh stack is running
        const STARTED = 1 << 0;
        /// Attached to a parent
        const PARENT_CONNECTED = 1 << 1;
        /// Root has reached its child threshold
        const CHILDREN_THRESHOLD_MET = 1 << 2;
        /// Root holds an upstream address
        const ROOT_HAS_IP = 1 << 3;
    }
}

/// Wait errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// The overall bound elapsed before the bits were set
    #[error("timed out after {waited:?} waiting for {bits:?}")]
    Timeout {
        /// Bits that were awaited
        bits: ConnectionBits,
        /// Time spent waiting
        waited: Duration,
    },

    /// The signal set was torn down
    #[error("connection state closed")]
    Closed,
}

/// Independently settable connection bits with async waits
#[derive(Debug)]
pub struct ConnectionState {
    bits: watch::Sender<ConnectionBits>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    /// All bits clear
    pub fn new() -> Self {
        let (bits, _) = watch::channel(ConnectionBits::empty());
        Self { bits }
    }

    /// Current bits
    pub fn bits(&self) -> ConnectionBits {
        *self.bits.borrow()
    }

    /// Whether every bit in `mask` is set
    pub fn contains(&self, mask: ConnectionBits) -> bool {
        self.bits().contains(mask)
    }

    /// Set bits
    pub fn set(&self, mask: ConnectionBits) {
        self.bits.send_modify(|bits| bits.insert(mask));
    }

    /// Clear bits
    pub fn clear(&self, mask: ConnectionBits) {
        self.bits.send_modify(|bits| bits.remove(mask));
    }

    /// Wait until every bit in `mask` is set.
    ///
    /// Without a bound the wait repeats [`WAIT_TICK`] polls indefinitely.
    pub async fn wait_bits(
        &self,
        mask: ConnectionBits,
        bound: Option<Duration>,
    ) -> Result<(), WaitError> {
        let started = Instant::now();
        let mut rx = self.bits.subscribe();

        loop {
            if rx.borrow_and_update().contains(mask) {
                return Ok(());
            }

            let waited = started.elapsed();
            if let Some(bound) = bound {
                if waited >= bound {
                    return Err(WaitError::Timeout { bits: mask, waited });
                }
            }

            let tick = match bound {
                Some(bound) => WAIT_TICK.min(bound - waited),
                None => WAIT_TICK,
            };

            match tokio::time::timeout(tick, rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(WaitError::Closed),
                Err(_) => debug!("Still waiting for {:?} after {:?}", mask, started.elapsed()),
            }
        }
    }
}
