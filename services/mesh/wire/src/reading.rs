//! Sensor reading model.
//!
//! The mesh only counts and serializes readings, it never interprets their
//! magnitudes. A reading is either a three-axis vector or a quaternion.

use crate::WireError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of reading requested from the IMU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingKind {
    /// Accelerometer vector
    Accel,
    /// Magnetometer vector
    Mag,
    /// Gyroscope vector
    Gyro,
    /// Euler angles (heading, roll, pitch)
    Euler,
    /// Absolute orientation quaternion
    Quaternion,
    /// Linear acceleration (gravity removed)
    LinearAccel,
    /// Gravity vector
    Gravity,
}

impl ReadingKind {
    /// All kinds, in register order
    pub const ALL: [ReadingKind; 7] = [
        ReadingKind::Accel,
        ReadingKind::Mag,
        ReadingKind::Gyro,
        ReadingKind::Euler,
        ReadingKind::Quaternion,
        ReadingKind::LinearAccel,
        ReadingKind::Gravity,
    ];

    /// Name used in the `"type"` field
    pub fn as_str(self) -> &'static str {
        match self {
            ReadingKind::Accel => "Accel",
            ReadingKind::Mag => "Mag",
            ReadingKind::Gyro => "Gyro",
            ReadingKind::Euler => "Euler",
            ReadingKind::Quaternion => "Quaternion",
            ReadingKind::LinearAccel => "LinearAccel",
            ReadingKind::Gravity => "Gravity",
        }
    }

    /// Whether readings of this kind carry a `W` component
    pub fn is_quaternion(self) -> bool {
        self == ReadingKind::Quaternion
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingKind {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReadingKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| WireError::Kind(s.to_string()))
    }
}

/// Where on the body a node is worn.
///
/// The chest node is the superpeer; right-side locations are odd, left-side even.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyLocation {
    /// Chest
    Chest = 0x00,
    /// Right upper arm
    RightArmUpper = 0x01,
    /// Left upper arm
    LeftArmUpper = 0x02,
    /// Right forearm
    RightArmLower = 0x03,
    /// Left forearm
    LeftArmLower = 0x04,
    /// Right thigh
    RightThigh = 0x05,
    /// Left thigh
    LeftThigh = 0x06,
    /// Right shin
    RightShin = 0x07,
    /// Left shin
    LeftShin = 0x08,
}

impl BodyLocation {
    const ALL: [BodyLocation; 9] = [
        BodyLocation::Chest,
        BodyLocation::RightArmUpper,
        BodyLocation::LeftArmUpper,
        BodyLocation::RightArmLower,
        BodyLocation::LeftArmLower,
        BodyLocation::RightThigh,
        BodyLocation::LeftThigh,
        BodyLocation::RightShin,
        BodyLocation::LeftShin,
    ];

    /// Name used in the `"body"` field
    pub fn as_str(self) -> &'static str {
        match self {
            BodyLocation::Chest => "Chest",
            BodyLocation::RightArmUpper => "RightArmUpper",
            BodyLocation::LeftArmUpper => "LeftArmUpper",
            BodyLocation::RightArmLower => "RightArmLower",
            BodyLocation::LeftArmLower => "LeftArmLower",
            BodyLocation::RightThigh => "RightThigh",
            BodyLocation::LeftThigh => "LeftThigh",
            BodyLocation::RightShin => "RightShin",
            BodyLocation::LeftShin => "LeftShin",
        }
    }
}

impl fmt::Display for BodyLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyLocation {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BodyLocation::ALL
            .into_iter()
            .find(|loc| loc.as_str() == s)
            .ok_or_else(|| WireError::Location(s.to_string()))
    }
}

impl TryFrom<u8> for BodyLocation {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        BodyLocation::ALL
            .into_iter()
            .find(|loc| *loc as u8 == value)
            .ok_or_else(|| WireError::Location(value.to_string()))
    }
}

/// Numeric components of a reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Components {
    /// Three-axis vector
    Vector {
        /// X axis
        x: f64,
        /// Y axis
        y: f64,
        /// Z axis
        z: f64,
    },
    /// Unit quaternion
    Quaternion {
        /// Scalar part
        w: f64,
        /// X part
        x: f64,
        /// Y part
        y: f64,
        /// Z part
        z: f64,
    },
}

impl Components {
    /// `W` component, present only for quaternions
    pub fn w(&self) -> Option<f64> {
        match *self {
            Components::Vector { .. } => None,
            Components::Quaternion { w, .. } => Some(w),
        }
    }

    /// `(X, Y, Z)` components
    pub fn xyz(&self) -> (f64, f64, f64) {
        match *self {
            Components::Vector { x, y, z } => (x, y, z),
            Components::Quaternion { x, y, z, .. } => (x, y, z),
        }
    }
}

/// A single reading taken by the local IMU
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Reading kind
    pub kind: ReadingKind,
    /// Where the node is worn
    pub body: BodyLocation,
    /// Timestamp in milliseconds since boot
    pub ticks: u64,
    /// Numeric payload
    pub components: Components,
}

impl SensorReading {
    /// Create a vector reading
    pub fn vector(kind: ReadingKind, body: BodyLocation, ticks: u64, x: f64, y: f64, z: f64) -> Self {
        Self {
            kind,
            body,
            ticks,
            components: Components::Vector { x, y, z },
        }
    }

    /// Create a quaternion reading
    pub fn quaternion(body: BodyLocation, ticks: u64, w: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            kind: ReadingKind::Quaternion,
            body,
            ticks,
            components: Components::Quaternion { w, x, y, z },
        }
    }
}
