//! JSON message types for the front-end command channel.
//!
//! Front-ends (control panels) speak JSON over a persistent WebSocket.  Every
//! message is a JSON object with a `"type"` field that identifies the variant;
//! all other fields sit in the same object:
//!
//! ```json
//! {"type":"keyboard","device":"R58M123","key":"TAB","modifiers":{"ctrl":false,"shift":true,"alt":false}}
//! {"type":"text","device":"broadcast","text":"hello"}
//! {"type":"get_devices"}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles this automatically.
//!
//! # Why separate inbound and outbound message types?
//!
//! The two directions carry different information: front-ends send commands,
//! the server sends device lists and acknowledgements.  Two distinct enums
//! make it a compile-time error to send a command back to a front-end.

use serde::{Deserialize, Serialize};

use keyrelay_core::{DeviceSummary, Modifiers};

/// Reserved device name addressing every registered device.
pub const BROADCAST_TARGET: &str = "broadcast";

// ── Front-end → server ────────────────────────────────────────────────────────

/// All commands a front-end can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrontEndCommand {
    /// Press and release one key, optionally with modifiers held.
    Keyboard {
        /// Device serial, or `"broadcast"`.
        device: String,
        /// Symbolic key name, matched case-insensitively (`"TAB"`, `"a"`).
        key: String,
        /// Absent modifiers (or an absent object) mean "not held".
        #[serde(default)]
        modifiers: Modifiers,
    },

    /// Type a string, one keystroke per mapped character.
    Text {
        /// Device serial, or `"broadcast"`.
        device: String,
        text: String,
    },

    /// Ask for the current device list.
    GetDevices,
}

/// Which devices a command addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<'a> {
    Broadcast,
    Device(&'a str),
}

impl<'a> Target<'a> {
    pub fn parse(device: &'a str) -> Self {
        if device == BROADCAST_TARGET {
            Target::Broadcast
        } else {
            Target::Device(device)
        }
    }
}

// ── Server → front-end ────────────────────────────────────────────────────────

/// One entry of the device list pushed to front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceJson {
    pub serial: String,
    pub name: String,
    pub port: Option<u16>,
    pub ws_url: String,
    pub connected: bool,
}

impl From<&DeviceSummary> for DeviceJson {
    fn from(summary: &DeviceSummary) -> Self {
        Self {
            serial: summary.id.to_string(),
            name: summary.label.clone(),
            port: summary.port,
            ws_url: summary.endpoint.clone(),
            connected: summary.connected(),
        }
    }
}

/// Outcome field of an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Success,
    Error,
}

/// All messages the server sends to front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full device list.  Pushed on connect, on request, and on every
    /// registry change.
    Devices { devices: Vec<DeviceJson> },

    /// Reply to a keyboard or text command.
    Ack { status: AckStatus, message: String },

    /// The inbound frame could not be decoded.
    Error { message: String },
}

impl ServerMessage {
    pub fn devices<'a>(summaries: impl IntoIterator<Item = &'a DeviceSummary>) -> Self {
        ServerMessage::Devices {
            devices: summaries.into_iter().map(DeviceJson::from).collect(),
        }
    }

    pub fn ack_success(message: impl Into<String>) -> Self {
        ServerMessage::Ack {
            status: AckStatus::Success,
            message: message.into(),
        }
    }

    pub fn ack_error(message: impl Into<String>) -> Self {
        ServerMessage::Ack {
            status: AckStatus::Error,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
