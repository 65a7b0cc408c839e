//! Infrastructure layer for keyrelay-server.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from front-ends and opening WebSocket connections to devices.
//!
//! # Responsibilities
//!
//! - Opening, feeding, and closing device connections (`device_conn`)
//! - Binding the front-end listener and running per-session tasks
//!   (`ws_server`)
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Deciding which devices a command goes to (that is the application layer)
//! - Message type definitions (that is the domain layer)
//! - Configuration parsing (that is done in `main.rs`)

pub mod device_conn;
pub mod ws_server;

pub use device_conn::{DeviceConnection, WsDeviceConnector};
pub use ws_server::{run_server, FrontEndServer};
