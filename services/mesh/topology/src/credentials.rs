//! Bounded radio credentials.
//!
//! SSID and password fields on the radio are fixed-size. Values are checked
//! once at construction and rejected when too long; nothing is truncated.

use crate::TopologyError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SSID field capacity in bytes
pub const MAX_SSID_LEN: usize = 32;

/// Password field capacity in bytes
pub const MAX_PASSWORD_LEN: usize = 64;

/// Authentication mode advertised by an access point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// No authentication
    Open,
    /// WEP
    Wep,
    /// WPA-PSK
    WpaPsk,
    /// WPA2-PSK
    Wpa2Psk,
    /// WPA/WPA2-PSK
    WpaWpa2Psk,
}

impl AuthMode {
    /// Whether a password must be supplied
    pub fn requires_password(self) -> bool {
        self != AuthMode::Open
    }
}

/// An SSID no longer than [`MAX_SSID_LEN`]
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Ssid(String);

impl Ssid {
    /// Validate and wrap an SSID
    pub fn new(value: impl Into<String>) -> Result<Self, TopologyError> {
        let value = value.into();
        if value.len() > MAX_SSID_LEN {
            return Err(TopologyError::CredentialTooLong {
                field: "ssid",
                len: value.len(),
                limit: MAX_SSID_LEN,
            });
        }
        Ok(Self(value))
    }

    /// SSID text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ssid({:?})", self.0)
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A password no longer than [`MAX_PASSWORD_LEN`]; never printed
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Password(String);

impl Password {
    /// Validate and wrap a password
    pub fn new(value: impl Into<String>) -> Result<Self, TopologyError> {
        let value = value.into();
        if value.len() > MAX_PASSWORD_LEN {
            return Err(TopologyError::CredentialTooLong {
                field: "password",
                len: value.len(),
                limit: MAX_PASSWORD_LEN,
            });
        }
        Ok(Self(value))
    }

    /// Password text
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssid_bounds() {
        assert!(Ssid::new("a".repeat(MAX_SSID_LEN)).is_ok());
        let err = Ssid::new("a".repeat(MAX_SSID_LEN + 1)).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::CredentialTooLong { field: "ssid", len: 33, limit: 32 }
        ));
    }

    #[test]
    fn test_password_bounds_and_redaction() {
        assert!(Password::new("p".repeat(MAX_PASSWORD_LEN + 1)).is_err());
        assert!(Password::new("p".repeat(MAX_PASSWORD_LEN)).is_ok());

        let pwd = Password::new("secret").unwrap();
        assert_eq!(pwd.expose(), "secret");
        assert_eq!(format!("{:?}", pwd), "Password(***)");
    }

    #[test]
    fn test_auth_mode_password() {
        assert!(!AuthMode::Open.requires_password());
        assert!(AuthMode::Wpa2Psk.requires_password());
    }
}
