//! keyrelay relay entry point.
//!
//! This binary connects to every device listed in the manifest and accepts
//! front-end WebSocket sessions whose keyboard and text commands it fans out
//! to one device or all of them.
//!
//! # Usage
//!
//! ```text
//! keyrelay [OPTIONS]
//!
//! Options:
//!   --ws-port <PORT>              Front-end listener port [default: 7777]
//!   --ws-bind <ADDR>              Front-end bind address [default: 127.0.0.1]
//!   --devices <FILE>              TOML device manifest
//!   --device <SERIAL=NAME@URL>    Inline device (repeatable)
//!   --connect-timeout <SECS>      Per-device connect timeout [default: 10]
//!   --hold-ms <MS>                Key hold duration [default: 50]
//!   --char-delay-ms <MS>          Delay between typed characters [default: 100]
//!   --ping-interval <SECS>        Front-end keepalive ping [default: 20]
//!   --ping-timeout <SECS>         Front-end idle timeout [default: 60]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                    | Default      | Description                 |
//! |-----------------------------|--------------|-----------------------------|
//! | `KEYRELAY_WS_PORT`          | `7777`       | Front-end listener port     |
//! | `KEYRELAY_WS_BIND`          | `127.0.0.1`  | Front-end bind address      |
//! | `KEYRELAY_DEVICES`          | (none)       | Device manifest path        |
//! | `KEYRELAY_CONNECT_TIMEOUT`  | `10`         | Connect timeout (secs)      |
//! | `KEYRELAY_HOLD_MS`          | `50`         | Key hold (ms)               |
//! | `KEYRELAY_CHAR_DELAY_MS`    | `100`        | Inter-character delay (ms)  |
//! | `KEYRELAY_PING_INTERVAL`    | `20`         | Keepalive ping (secs)       |
//! | `KEYRELAY_PING_TIMEOUT`     | `60`         | Idle timeout (secs)         |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keyrelay_core::KeyTiming;
use keyrelay_server::application::{CommandHandler, DeviceRegistry, FanOut};
use keyrelay_server::domain::{DeviceEntry, DeviceManifest, RelayConfig};
use keyrelay_server::infrastructure::{FrontEndServer, WsDeviceConnector};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Keyboard relay: one controller, many devices.
#[derive(Debug, Parser)]
#[command(
    name = "keyrelay",
    about = "Fans keyboard commands from WebSocket front-ends out to remote devices",
    version
)]
struct Cli {
    /// TCP port front-ends connect to (ws://host:PORT).
    #[arg(long, default_value_t = 7777, env = "KEYRELAY_WS_PORT")]
    ws_port: u16,

    /// IP address to bind the front-end listener to.
    ///
    /// The command channel has no authentication; only bind to a non-loopback
    /// address on a trusted network.
    #[arg(long, default_value = "127.0.0.1", env = "KEYRELAY_WS_BIND")]
    ws_bind: String,

    /// TOML manifest listing the devices to drive.
    #[arg(long, env = "KEYRELAY_DEVICES")]
    devices: Option<PathBuf>,

    /// Inline device as SERIAL=NAME@URL or SERIAL@URL.  Repeatable.
    #[arg(long = "device", value_name = "SERIAL=NAME@URL")]
    device: Vec<DeviceEntry>,

    /// Seconds allowed for each device handshake and metadata message.
    #[arg(long, default_value_t = 10, env = "KEYRELAY_CONNECT_TIMEOUT")]
    connect_timeout: u64,

    /// How long a key is held between press and release, in milliseconds.
    #[arg(long, default_value_t = 50, env = "KEYRELAY_HOLD_MS")]
    hold_ms: u64,

    /// Pause between characters of a text command, in milliseconds.
    #[arg(long, default_value_t = 100, env = "KEYRELAY_CHAR_DELAY_MS")]
    char_delay_ms: u64,

    /// Seconds between keepalive Pings to each front-end.
    #[arg(long, default_value_t = 20, env = "KEYRELAY_PING_INTERVAL")]
    ping_interval: u64,

    /// Seconds of silence after which a front-end session is closed.
    #[arg(long, default_value_t = 60, env = "KEYRELAY_PING_TIMEOUT")]
    ping_timeout: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--ws-bind` is not a valid IP address or a
    /// duration is zero.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let ws_bind_addr: SocketAddr = format!("{}:{}", self.ws_bind, self.ws_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid front-end bind address: '{}:{}'",
                    self.ws_bind, self.ws_port
                )
            })?;

        anyhow::ensure!(self.connect_timeout > 0, "--connect-timeout must be at least 1 second");
        anyhow::ensure!(self.ping_interval > 0, "--ping-interval must be at least 1 second");
        anyhow::ensure!(
            self.ping_timeout > self.ping_interval,
            "--ping-timeout must be longer than --ping-interval"
        );

        Ok(RelayConfig {
            ws_bind_addr,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            timing: KeyTiming::from_millis(self.hold_ms, self.char_delay_ms),
            ping_interval: Duration::from_secs(self.ping_interval),
            ping_timeout: Duration::from_secs(self.ping_timeout),
        })
    }

    /// Reads the manifest file (if any) and appends the inline devices.
    fn load_manifest(&self) -> anyhow::Result<DeviceManifest> {
        let mut manifest = match &self.devices {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read device manifest {}", path.display()))?;
                DeviceManifest::from_toml_str(&text)
                    .with_context(|| format!("invalid device manifest {}", path.display()))?
            }
            None => DeviceManifest::default(),
        };
        manifest
            .extend(self.device.iter().cloned())
            .context("invalid --device list")?;
        Ok(manifest)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised (`RUST_LOG`, default `info`).
/// 2. CLI arguments are parsed and turned into a [`RelayConfig`] and a
///    [`DeviceManifest`].
/// 3. Every manifest device is registered, and the front-end listener is
///    bound.  Failing to bind is the only fatal runtime error.
/// 4. All devices are connected concurrently in the background.
/// 5. The accept loop runs until Ctrl+C clears the shared `AtomicBool`.
/// 6. Every device connection is closed before exit.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let manifest = cli.load_manifest()?;
    let config = cli.into_relay_config()?;

    if manifest.is_empty() {
        warn!("no devices configured; use --devices or --device");
    }

    let registry = Arc::new(DeviceRegistry::new(Arc::new(WsDeviceConnector)));
    for entry in &manifest.devices {
        registry
            .add(entry.serial.as_str(), entry.label(), entry.ws_url.as_str())
            .with_context(|| format!("failed to register device {}", entry.serial))?;
    }

    let handler = CommandHandler::new(FanOut::new(Arc::clone(&registry), config.timing));
    let connect_timeout = config.connect_timeout;
    let server = FrontEndServer::bind(config, handler).await?;

    info!(
        "keyrelay starting: front-end ws://{}, {} device(s)",
        server.local_addr()?,
        registry.len()
    );

    let connecting = Arc::clone(&registry);
    tokio::spawn(async move {
        let report = connecting.connect_all(connect_timeout).await;
        info!(
            "connected {}/{} device(s)",
            report.connected_count(),
            report.outcomes.len()
        );
        for outcome in report.outcomes.iter().filter(|o| !o.success()) {
            if let Some(reason) = outcome.error_detail() {
                warn!(device = %outcome.device_id, "not connected: {reason}");
            }
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    server.run(running).await?;

    registry.close_all().await;
    info!("keyrelay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
