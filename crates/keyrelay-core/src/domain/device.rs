//! Device identity and connection state.
//!
//! A *device* is one remote input target, reachable at an endpoint that some
//! external provisioning step made available.  These types carry no I/O: the
//! connection object itself lives in the server crate's registry.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a device (typically its serial number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Connection lifecycle of a device.
///
/// ```text
/// Disconnected ──open──► Connecting ──► Connected
///      ▲                     │              │
///      └──── failure ────────┘   close / transport error
/// ```
///
/// Only `Connected` accepts reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of one registered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub id: DeviceId,
    /// Human-readable display name.
    pub label: String,
    /// Address the connection is opened against (e.g. `ws://localhost:8886`).
    pub endpoint: String,
    /// Port component of `endpoint`, when it has one.
    pub port: Option<u16>,
    pub state: ConnectionState,
    /// First message the device sent after connecting, kept verbatim.
    pub metadata: Option<String>,
}

impl DeviceSummary {
    pub fn connected(&self) -> bool {
        self.state.is_connected()
    }
}
