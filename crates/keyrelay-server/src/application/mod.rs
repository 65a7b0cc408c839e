//! Application layer for keyrelay-server.
//!
//! The application layer orchestrates the business logic: it knows *what* to
//! do, but delegates *how* to do it to the infrastructure layer through the
//! [`DeviceConnector`] / [`DeviceLink`] traits.
//!
//! # Responsibilities
//!
//! - Keeping the set of target devices and their connection state (`registry`)
//! - Playing one key or text operation on one or all devices (`fanout`)
//! - Turning front-end commands into acknowledgements (`commands`)
//! - Tracking connected front-end sessions (`sessions`)
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod commands;
pub mod fanout;
pub mod link;
pub mod outcome;
pub mod registry;
pub mod sessions;

pub use commands::CommandHandler;
pub use fanout::{DeviceAction, DeviceOp, FanOut};
pub use link::{DeviceConnector, DeviceLink, LinkError};
pub use outcome::{CommandOutcome, DispatchFailure};
pub use registry::{ConnectReport, DeviceRegistry, RegistryError, RegistryEvent};
pub use sessions::{push_device_list_on_change, SessionHub};
