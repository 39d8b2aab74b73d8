//! Protocol versioning for Courier.
//!
//! Peers advertise their protocol version during the transport handshake
//! (as a WebSocket subprotocol); versions with the same major number are
//! compatible.

use serde::{Deserialize, Serialize};

/// Current protocol version.
pub const PROTOCOL_VERSION: Version = Version { major: 1, minor: 0 };

/// Subprotocol name prefix used during transport negotiation.
pub const SUBPROTOCOL_PREFIX: &str = "courier";

/// Protocol version information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major version - breaking changes increment this.
    pub major: u8,
    /// Minor version - backwards-compatible changes increment this.
    pub minor: u8,
}

impl Version {
    /// Create a new version.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Check if this version is compatible with another version.
    ///
    /// Versions are compatible if they share the same major version.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }

    /// Subprotocol identifier advertised during the transport handshake,
    /// e.g. `courier.v1`.
    #[must_use]
    pub fn subprotocol(&self) -> String {
        format!("{}.v{}", SUBPROTOCOL_PREFIX, self.major)
    }

    /// Parse a subprotocol identifier back into a version.
    ///
    /// Only the major number is carried on the wire; the minor defaults to 0.
    #[must_use]
    pub fn from_subprotocol(value: &str) -> Option<Self> {
        let rest = value.strip_prefix(SUBPROTOCOL_PREFIX)?.strip_prefix(".v")?;
        let major = rest.parse().ok()?;
        Some(Self { major, minor: 0 })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Default for Version {
    fn default() -> Self {
        PROTOCOL_VERSION
    }
}
