//! Transport seams between the application layer and device connections.
//!
//! The registry and the fan-out coordinator only ever talk to a device through
//! these traits.  The infrastructure layer provides the WebSocket
//! implementation; tests inject recording doubles.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use keyrelay_core::{ConnectionState, KeyReport};

/// Failures of a single device connection.
///
/// Always scoped to one device: the coordinator turns these into a failure
/// outcome for that device and carries on with the others.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The endpoint did not complete the handshake (and metadata message)
    /// within the allowed time.
    #[error("connection to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    /// Nothing is listening at the endpoint.
    #[error("connection to {endpoint} refused")]
    Refused { endpoint: String },

    /// The device closed the connection before sending its metadata message.
    #[error("device at {endpoint} closed before sending metadata")]
    NoMetadata { endpoint: String },

    /// Any other transport-level failure (reset, protocol error, bad URL).
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection is not in the Connected state.
    #[error("not connected")]
    Disconnected,
}

impl LinkError {
    /// `true` when the error means the connection is gone for good.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, LinkError::Transport(_) | LinkError::Disconnected)
    }
}

/// One open duplex connection to a device.
#[async_trait]
pub trait DeviceLink: Send {
    /// Transmits one keyboard report.  Fails fast when not connected.
    async fn send(&mut self, report: &KeyReport) -> Result<(), LinkError>;

    /// Closes the connection.  Calling this more than once is a no-op.
    async fn close(&mut self);

    fn state(&self) -> ConnectionState;

    /// The first message the device sent after connecting.
    fn metadata(&self) -> Option<&str>;

    /// Hands out a receiver that resolves once the device side goes away.
    ///
    /// Returns `Some` at most once.  Links that cannot observe the remote side
    /// return `None`.
    fn take_closed_signal(&mut self) -> Option<oneshot::Receiver<()>>;
}

/// Opens [`DeviceLink`]s to endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Opens a connection, resolving to a link or a typed failure within
    /// `timeout`.
    async fn open(&self, endpoint: &str, timeout: Duration)
        -> Result<Box<dyn DeviceLink>, LinkError>;

    /// Port the endpoint addresses, shown to front-ends.  `None` when the
    /// endpoint names no explicit port or cannot be parsed.
    fn endpoint_port(&self, endpoint: &str) -> Option<u16>;
}
