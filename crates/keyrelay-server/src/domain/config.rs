//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from CLI arguments (preferred for production) or from
//! sensible defaults (useful for local development and tests).
//!
//! # Design rationale
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the relay easy to embed in tests.
//! `main.rs` is responsible for populating the struct from CLI args or
//! environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use keyrelay_core::KeyTiming;

/// All runtime configuration for the relay.
///
/// # Example
///
/// ```rust
/// use keyrelay_server::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 7777);
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The address the front-end command server binds to.
    ///
    /// The front-end channel has no authentication, so the default only
    /// accepts local connections.
    pub ws_bind_addr: SocketAddr,

    /// Upper bound for opening one device connection, including the wait
    /// for the device's metadata message.
    pub connect_timeout: Duration,

    /// Default key hold and inter-character delay for playback.
    pub timing: KeyTiming,

    /// How often the server pings each front-end session.
    pub ping_interval: Duration,

    /// A front-end session that sends nothing (not even a Pong) for this long
    /// is closed.
    pub ping_timeout: Duration,
}

impl Default for RelayConfig {
    /// | Field           | Default             |
    /// |-----------------|---------------------|
    /// | ws_bind_addr    | `127.0.0.1:7777`    |
    /// | connect_timeout | 10 seconds          |
    /// | timing          | 50 ms hold, 100 ms between characters |
    /// | ping_interval   | 20 seconds          |
    /// | ping_timeout    | 60 seconds          |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([127, 0, 0, 1], 7777)),
            connect_timeout: Duration::from_secs(10),
            timing: KeyTiming::default(),
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(60),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
