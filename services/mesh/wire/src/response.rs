//! Response codes returned by the collector and fanned out to every leaf.

use crate::reading::ReadingKind;
use crate::WireError;
use std::fmt;

/// Response code carried in the collector's `Response` header and sent from
/// the root to each leaf as a bare numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Generic failure
    Fail,
    /// Readings accepted
    Ok,
    /// Collector could not be reached
    ConnectFail,
    /// Socket error while sending
    WriteFail,
    /// Collector asks for one reading kind to be resent
    Resend(ReadingKind),
    /// Node is not connected
    NoWifi,
    /// Broker side error
    MqttError,
    /// Any other code, propagated verbatim
    Other(i32),
}

impl ResponseCode {
    /// Numeric value on the wire
    pub fn as_i32(self) -> i32 {
        match self {
            ResponseCode::Fail => -1,
            ResponseCode::Ok => 0,
            ResponseCode::ConnectFail => 1,
            ResponseCode::WriteFail => 2,
            ResponseCode::Resend(ReadingKind::Accel) => 3,
            ResponseCode::Resend(ReadingKind::Mag) => 4,
            ResponseCode::Resend(ReadingKind::Gyro) => 5,
            ResponseCode::Resend(ReadingKind::Euler) => 6,
            ResponseCode::Resend(ReadingKind::LinearAccel) => 7,
            ResponseCode::Resend(ReadingKind::Gravity) => 8,
            // No resend code exists for quaternions
            ResponseCode::Resend(ReadingKind::Quaternion) => -1,
            ResponseCode::NoWifi => 9,
            ResponseCode::MqttError => 10,
            ResponseCode::Other(code) => code,
        }
    }

    /// Reading kind the collector wants resent, if any
    pub fn retry_kind(self) -> Option<ReadingKind> {
        match self {
            ResponseCode::Resend(kind) => Some(kind),
            _ => None,
        }
    }

    /// Whether the collector accepted the readings
    pub fn is_ok(self) -> bool {
        self == ResponseCode::Ok
    }

    /// Mesh payload sent from the root to a leaf
    pub fn to_payload(self) -> Vec<u8> {
        self.as_i32().to_string().into_bytes()
    }

    /// Parse a mesh payload or header value
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let trimmed = text.trim().trim_end_matches('\0');
        trimmed
            .parse::<i32>()
            .map(ResponseCode::from)
            .map_err(|_| WireError::Code(trimmed.to_string()))
    }
}

impl From<i32> for ResponseCode {
    fn from(code: i32) -> Self {
        match code {
            -1 => ResponseCode::Fail,
            0 => ResponseCode::Ok,
            1 => ResponseCode::ConnectFail,
            2 => ResponseCode::WriteFail,
            3 => ResponseCode::Resend(ReadingKind::Accel),
            4 => ResponseCode::Resend(ReadingKind::Mag),
            5 => ResponseCode::Resend(ReadingKind::Gyro),
            6 => ResponseCode::Resend(ReadingKind::Euler),
            7 => ResponseCode::Resend(ReadingKind::LinearAccel),
            8 => ResponseCode::Resend(ReadingKind::Gravity),
            9 => ResponseCode::NoWifi,
            10 => ResponseCode::MqttError,
            other => ResponseCode::Other(other),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCode::Fail => write!(f, "failure"),
            ResponseCode::Ok => write!(f, "ok"),
            ResponseCode::ConnectFail => write!(f, "could not connect to collector"),
            ResponseCode::WriteFail => write!(f, "socket error while sending"),
            ResponseCode::Resend(kind) => write!(f, "resend {} reading", kind),
            ResponseCode::NoWifi => write!(f, "not connected"),
            ResponseCode::MqttError => write!(f, "mqtt error"),
            ResponseCode::Other(code) => write!(f, "code {}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table() {
        for code in -1..=10 {
            assert_eq!(ResponseCode::from(code).as_i32(), code);
        }
        assert_eq!(ResponseCode::from(42), ResponseCode::Other(42));
        assert_eq!(ResponseCode::from(5).retry_kind(), Some(ReadingKind::Gyro));
        assert_eq!(ResponseCode::from(0).retry_kind(), None);
    }

    #[test]
    fn test_payload_parse() {
        assert_eq!(ResponseCode::Ok.to_payload(), b"0".to_vec());
        assert_eq!(ResponseCode::parse("0").unwrap(), ResponseCode::Ok);
        assert_eq!(ResponseCode::parse(" 7\0\0").unwrap(), ResponseCode::Resend(ReadingKind::LinearAccel));
        assert!(ResponseCode::parse("No data!").is_err());
        assert!(ResponseCode::parse("").is_err());
    }
}
