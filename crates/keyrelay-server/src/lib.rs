//! keyrelay-server library crate.
//!
//! This crate relays keyboard commands from front-end control panels to many
//! remote devices at once.  Front-ends speak JSON over WebSocket; every
//! device runs an input server that takes 9-byte keyboard reports as binary
//! WebSocket frames.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Front-ends (JSON over WebSocket)
//!         ↕
//! [keyrelay-server]
//!   ├── domain/           Pure types: JSON messages, RelayConfig, device manifest
//!   ├── application/      Registry, fan-out coordinator, command handler, sessions
//!   └── infrastructure/
//!         ├── ws_server/   Front-end accept loop (tokio-tungstenite)
//!         └── device_conn/ WebSocket client per device
//!         ↕
//! Devices (binary keyboard reports over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async runtime.
//! - `application` depends on `domain` and `keyrelay-core`, and reaches the
//!   network only through the `DeviceConnector` / `DeviceLink` traits.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tokio-tungstenite`.
//!
//! # For beginners: why this structure?
//!
//! The registry and the fan-out coordinator are the interesting logic:
//! concurrency, failure isolation, per-device ordering.  Putting the socket
//! code behind two small traits means all of that can be unit tested with
//! in-memory fake devices, while the integration tests in `tests/` cover the
//! real WebSocket path.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: registry, fan-out, command handling.
pub mod application;

/// Infrastructure layer: front-end server and device connections.
pub mod infrastructure;
