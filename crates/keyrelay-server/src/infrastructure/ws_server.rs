//! Front-end command server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from front-ends.
//! 3. Upgrading each connection to a WebSocket session and registering it
//!    in the [`SessionHub`].
//! 4. Pushing the current device list as the session's first message.
//! 5. Running two concurrent halves per session:
//!    - **Reader**: decodes JSON commands, runs them through the
//!      [`CommandHandler`], and queues exactly one reply per command.
//!    - **Writer**: drains the session's outbound queue onto the socket and
//!      sends a WebSocket Ping every `ping_interval`.
//! 6. Re-pushing the device list to every session whenever the registry
//!    changes.
//! 7. Gracefully shutting down when the `running` flag is cleared.
//!
//! # Keepalive
//!
//! A session that sends nothing at all (no command, no Pong) for
//! `ping_timeout` is closed.  Browsers answer our Pings automatically, so a
//! healthy idle tab stays connected.
//!
//! # Failure isolation
//!
//! Every session runs in its own Tokio task.  A malformed frame gets an
//! `error` reply and the session stays open; a session that dies takes
//! nothing else with it.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::commands::CommandHandler;
use crate::application::sessions::{push_device_list_on_change, SessionHub};
use crate::domain::config::RelayConfig;
use crate::domain::messages::ServerMessage;

type FrontEndSocket = WebSocketStream<TcpStream>;

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound, not yet running, front-end server.
///
/// Binding is separate from running so callers (and tests binding port 0)
/// can learn the actual address before the accept loop starts.
pub struct FrontEndServer {
    listener: TcpListener,
    config: Arc<RelayConfig>,
    handler: CommandHandler,
    hub: Arc<SessionHub>,
}

impl FrontEndServer {
    /// Binds the listener on `config.ws_bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is already in use or the process lacks
    /// permission to bind.  This is the one fatal error of the relay.
    pub async fn bind(config: RelayConfig, handler: CommandHandler) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.ws_bind_addr)
            .await
            .with_context(|| {
                format!(
                    "failed to bind front-end listener on {}",
                    config.ws_bind_addr
                )
            })?;
        Ok(Self {
            listener,
            config: Arc::new(config),
            handler,
            hub: Arc::new(SessionHub::new()),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    pub fn sessions(&self) -> Arc<SessionHub> {
        Arc::clone(&self.hub)
    }

    /// Accepts front-end sessions until `running` is set to `false`.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!("front-end server listening on {}", self.local_addr()?);

        let pusher = tokio::spawn(push_device_list_on_change(
            self.handler.clone(),
            Arc::clone(&self.hub),
        ));

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    info!("new front-end connection from {peer_addr}");
                    let handler = self.handler.clone();
                    let hub = Arc::clone(&self.hub);
                    let config = Arc::clone(&self.config);
                    tokio::spawn(async move {
                        handle_front_end_session(stream, peer_addr, handler, hub, config).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient (e.g. out of file descriptors); keep serving.
                    error!("accept error: {e}");
                }
                Err(_) => {
                    // No connection within ACCEPT_POLL; re-check the flag.
                }
            }
        }

        pusher.abort();
        Ok(())
    }
}

/// Binds and runs the front-end server until `running` is cleared.
pub async fn run_server(
    config: RelayConfig,
    handler: CommandHandler,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    FrontEndServer::bind(config, handler).await?.run(running).await
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_front_end_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: CommandHandler,
    hub: Arc<SessionHub>,
    config: Arc<RelayConfig>,
) {
    match run_session(stream, peer_addr, handler, hub, config).await {
        Ok(()) => info!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: CommandHandler,
    hub: Arc<SessionHub>,
    config: Arc<RelayConfig>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (ws_tx, ws_rx) = ws_stream.split();

    let session = hub.register();
    info!(session = %session.id, "front-end session established: {peer_addr}");

    // First message on every session is the current device list.
    session
        .outbound
        .send(handler.device_list())
        .await
        .context("session queue closed before first push")?;

    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        session.inbox,
        config.ping_interval,
        peer_addr,
    ));

    tokio::select! {
        _ = read_loop(ws_rx, session.outbound, &handler, config.ping_timeout, peer_addr) => {
            debug!("session {peer_addr}: reader finished");
        }
        _ = &mut writer => {
            debug!("session {peer_addr}: writer finished");
        }
    }

    hub.unregister(session.id);
    writer.abort();
    Ok(())
}

/// Reads commands until the front-end leaves or goes silent.
async fn read_loop(
    mut ws_rx: SplitStream<FrontEndSocket>,
    outbound: mpsc::Sender<ServerMessage>,
    handler: &CommandHandler,
    idle_timeout: Duration,
    peer_addr: SocketAddr,
) {
    loop {
        let frame = match timeout(idle_timeout, ws_rx.next()).await {
            Err(_) => {
                warn!("session {peer_addr}: silent for {idle_timeout:?}, closing");
                break;
            }
            Ok(None) => {
                debug!("session {peer_addr}: stream ended");
                break;
            }
            Ok(Some(Err(WsError::ConnectionClosed | WsError::Protocol(_)))) => {
                debug!("session {peer_addr}: WebSocket closed");
                break;
            }
            Ok(Some(Err(e))) => {
                warn!("session {peer_addr}: WebSocket error: {e}");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let reply = match frame {
            WsMessage::Text(text) => handler.handle_frame(&text).await,
            WsMessage::Binary(_) => {
                warn!("session {peer_addr}: unexpected binary frame");
                ServerMessage::error("binary frames are not supported; send JSON text")
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            WsMessage::Close(_) => {
                debug!("session {peer_addr}: Close frame received");
                break;
            }
        };

        if outbound.send(reply).await.is_err() {
            break;
        }
    }
}

/// Writes queued messages and periodic Pings.
async fn write_loop(
    mut ws_tx: SplitSink<FrontEndSocket, WsMessage>,
    mut inbox: mpsc::Receiver<ServerMessage>,
    ping_interval: Duration,
    peer_addr: SocketAddr,
) {
    let mut ticker = interval(ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // first tick is immediate

    loop {
        let frame = tokio::select! {
            message = inbox.recv() => match message {
                Some(message) => match serde_json::to_string(&message) {
                    Ok(json) => WsMessage::Text(json),
                    Err(e) => {
                        error!("session {peer_addr}: JSON serialization error: {e}");
                        continue;
                    }
                },
                None => break,
            },
            _ = ticker.tick() => WsMessage::Ping(Vec::new()),
        };

        if let Err(e) = ws_tx.send(frame).await {
            debug!("session {peer_addr}: send failed (front-end gone): {e}");
            break;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
