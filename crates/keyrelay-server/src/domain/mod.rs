//! Domain layer for keyrelay-server.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or async runtimes.
//!
//! # What belongs in the domain layer?
//!
//! - Message types (the JSON "language" between front-ends and the relay)
//! - Configuration structures and the device manifest format
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod manifest;
pub mod messages;

pub use config::RelayConfig;
pub use manifest::{DeviceEntry, DeviceManifest, ManifestError};
pub use messages::{AckStatus, DeviceJson, FrontEndCommand, ServerMessage, Target, BROADCAST_TARGET};
