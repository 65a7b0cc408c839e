//! Per-device results of a dispatched operation.

use thiserror::Error;

use keyrelay_core::DeviceId;

use crate::application::link::LinkError;

/// Why an operation did not succeed on one device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    #[error("device '{0}' is not registered")]
    NotFound(DeviceId),

    #[error("device '{0}' is not connected")]
    NotConnected(DeviceId),

    /// Another connect attempt for the device has not finished yet.
    #[error("device '{0}' is still connecting")]
    Connecting(DeviceId),

    /// The registry refused the request outright.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Link(#[from] LinkError),

    /// The per-device task panicked or was cancelled.
    #[error("operation aborted: {0}")]
    Aborted(String),
}

/// Result of dispatching one command to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub device_id: DeviceId,
    /// `false` when the device was skipped without touching its connection
    /// (unknown or not connected).
    pub attempted: bool,
    pub failure: Option<DispatchFailure>,
}

impl CommandOutcome {
    pub fn succeeded(device_id: DeviceId) -> Self {
        Self {
            device_id,
            attempted: true,
            failure: None,
        }
    }

    pub fn failed(device_id: DeviceId, attempted: bool, failure: DispatchFailure) -> Self {
        Self {
            device_id,
            attempted,
            failure: Some(failure),
        }
    }

    pub fn skipped(device_id: DeviceId, failure: DispatchFailure) -> Self {
        Self::failed(device_id, false, failure)
    }

    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// Human-readable reason for a failure, `None` on success.
    pub fn error_detail(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }
}
