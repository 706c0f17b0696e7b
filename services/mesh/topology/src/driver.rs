//! Radio control seam used by topology formation.
//!
//! Implementations wrap the wireless stack. Every call must return promptly:
//! they are made from the event context, and scans are fire-and-forget with
//! completion reported later as a scan-done event.

use crate::credentials::AuthMode;
use crate::error::DriverError;
use crate::scan::{ParentConfig, ScanRecord};

/// Scan flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Listen for beacons only
    Passive,
    /// Send probe requests
    Active,
}

/// Radio operations needed to discover and attach to a parent
pub trait ScanDriver: Send + Sync {
    /// Start an asynchronous scan, hidden networks included
    fn start_scan(&self, mode: ScanMode) -> Result<(), DriverError>;

    /// Abort a scan in progress
    fn stop_scan(&self) -> Result<(), DriverError>;

    /// Records of the completed scan, in discovery order
    fn scan_records(&self, count: usize) -> Vec<ScanRecord>;

    /// Release the driver's copy of the scan results
    fn flush_scan_results(&self);

    /// Blocking scan of every visible access point
    fn scan_access_points(&self) -> Result<Vec<ScanRecord>, DriverError>;

    /// Authentication mode used for the node's own mesh soft-AP
    fn set_ap_auth_mode(&self, mode: AuthMode) -> Result<(), DriverError>;

    /// Commit a parent selection; connection completes asynchronously
    fn set_parent(&self, parent: &ParentConfig) -> Result<(), DriverError>;

    /// Start DHCP on the upstream interface (root only)
    fn start_address_acquisition(&self) -> Result<(), DriverError>;
}
