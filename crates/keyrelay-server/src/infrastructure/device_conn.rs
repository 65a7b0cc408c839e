//! WebSocket connections to device input servers.
//!
//! Each device runs an input server that accepts one WebSocket client.  Right
//! after the handshake the device sends a single metadata message (usually a
//! JSON text frame describing the device); after that it only receives.  The
//! relay writes one binary frame per [`KeyReport`].
//!
//! # Lifecycle
//!
//! ```text
//! open(endpoint, timeout)
//!   ├── TCP + WebSocket handshake ─┐
//!   └── wait for metadata frame  ──┴── both inside one timeout
//!          │
//!          ▼
//!      Connected ── send(report) ─► Message::Binary([100, mods, 0, key, 0, 0, 0, 0, 0])
//!          │
//!          ├── close()            ─► Disconnected (idempotent)
//!          └── device goes away   ─► reader task ends, closed signal fires
//! ```
//!
//! The read half is handed to a background task that drains (and ignores)
//! anything else the device sends.  When that task sees the stream end it
//! drops the sender of the closed signal, which the registry is watching.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use keyrelay_core::{ConnectionState, KeyReport};

use crate::application::link::{DeviceConnector, DeviceLink, LinkError};

type DeviceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for the close handshake so `close()` never hangs on a stalled
/// device.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// One open connection to one device.
pub struct DeviceConnection {
    endpoint: String,
    sink: Option<SplitSink<DeviceSocket, Message>>,
    reader: Option<JoinHandle<()>>,
    state: ConnectionState,
    metadata: String,
    /// Cleared by the reader task when the device side goes away.
    alive: Arc<AtomicBool>,
    closed_rx: Option<oneshot::Receiver<()>>,
}

impl DeviceConnection {
    /// Connects to `endpoint` and waits for the device's metadata message.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Timeout`] if handshake plus metadata take longer than
    ///   `timeout`.
    /// - [`LinkError::Refused`] if nothing listens at the endpoint.
    /// - [`LinkError::NoMetadata`] if the device hangs up before its first
    ///   message.
    /// - [`LinkError::Transport`] for anything else (bad URL, protocol error).
    pub async fn open(endpoint: &str, timeout: Duration) -> Result<Self, LinkError> {
        match tokio::time::timeout(timeout, Self::handshake(endpoint)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(%endpoint, ?timeout, "device connect timed out");
                Err(LinkError::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn handshake(endpoint: &str) -> Result<Self, LinkError> {
        let (socket, _response) = connect_async(endpoint)
            .await
            .map_err(|e| map_connect_error(endpoint, e))?;
        let (sink, mut stream) = socket.split();

        let metadata = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(Message::Binary(bytes))) => {
                    break String::from_utf8_lossy(&bytes).into_owned()
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(LinkError::NoMetadata {
                        endpoint: endpoint.to_string(),
                    })
                }
                // Ping/Pong/raw frames are not the metadata message.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(LinkError::Transport(e.to_string())),
            }
        };
        info!(%endpoint, %metadata, "device metadata received");

        let alive = Arc::new(AtomicBool::new(true));
        let (closed_tx, closed_rx) = oneshot::channel();
        let reader = tokio::spawn(drain_inbound(
            stream,
            endpoint.to_string(),
            Arc::clone(&alive),
            closed_tx,
        ));

        Ok(Self {
            endpoint: endpoint.to_string(),
            sink: Some(sink),
            reader: Some(reader),
            state: ConnectionState::Connected,
            metadata,
            alive,
            closed_rx: Some(closed_rx),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DeviceLink for DeviceConnection {
    async fn send(&mut self, report: &KeyReport) -> Result<(), LinkError> {
        if !self.alive.load(Ordering::Acquire) {
            self.state = ConnectionState::Disconnected;
        }
        let sink = match (&mut self.sink, self.state) {
            (Some(sink), ConnectionState::Connected) => sink,
            _ => return Err(LinkError::Disconnected),
        };
        if let Err(e) = sink.send(Message::Binary(report.to_vec())).await {
            warn!(endpoint = %self.endpoint, error = %e, "send to device failed");
            self.state = ConnectionState::Disconnected;
            return Err(LinkError::Transport(e.to_string()));
        }
        debug!(endpoint = %self.endpoint, %report, "report sent");
        Ok(())
    }

    async fn close(&mut self) {
        self.state = ConnectionState::Disconnected;
        if let Some(mut sink) = self.sink.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
                debug!(endpoint = %self.endpoint, "close handshake timed out");
            }
            info!(endpoint = %self.endpoint, "device connection closed");
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    fn state(&self) -> ConnectionState {
        if self.alive.load(Ordering::Acquire) {
            self.state
        } else {
            ConnectionState::Disconnected
        }
    }

    fn metadata(&self) -> Option<&str> {
        Some(&self.metadata)
    }

    fn take_closed_signal(&mut self) -> Option<oneshot::Receiver<()>> {
        self.closed_rx.take()
    }
}

impl Drop for DeviceConnection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Reads until the device side closes, then signals loss.
async fn drain_inbound(
    mut stream: SplitStream<DeviceSocket>,
    endpoint: String,
    alive: Arc<AtomicBool>,
    closed_tx: oneshot::Sender<()>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(frame)) => {
                debug!(%endpoint, ?frame, "device sent close");
                break;
            }
            Ok(other) => debug!(%endpoint, len = other.len(), "ignoring inbound frame"),
            Err(e) => {
                warn!(%endpoint, error = %e, "device connection error");
                break;
            }
        }
    }
    alive.store(false, Ordering::Release);
    let _ = closed_tx.send(());
}

fn map_connect_error(endpoint: &str, err: tungstenite::Error) -> LinkError {
    match err {
        tungstenite::Error::Io(io) if io.kind() == ErrorKind::ConnectionRefused => {
            LinkError::Refused {
                endpoint: endpoint.to_string(),
            }
        }
        other => LinkError::Transport(other.to_string()),
    }
}

/// [`DeviceConnector`] that opens real [`DeviceConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDeviceConnector;

#[async_trait]
impl DeviceConnector for WsDeviceConnector {
    async fn open(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceLink>, LinkError> {
        let conn = DeviceConnection::open(endpoint, timeout).await?;
        Ok(Box::new(conn))
    }

    fn endpoint_port(&self, endpoint: &str) -> Option<u16> {
        endpoint.parse::<Uri>().ok()?.port_u16()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_refused_io_error_maps_to_refused() {
        let err = tungstenite::Error::Io(io::Error::from(ErrorKind::ConnectionRefused));
        assert_eq!(
            map_connect_error("ws://127.0.0.1:1", err),
            LinkError::Refused {
                endpoint: "ws://127.0.0.1:1".to_string()
            }
        );
    }

    #[test]
    fn test_other_io_error_maps_to_transport() {
        let err = tungstenite::Error::Io(io::Error::from(ErrorKind::ConnectionReset));
        assert!(matches!(
            map_connect_error("ws://x:1", err),
            LinkError::Transport(_)
        ));
    }

    #[test]
    fn test_endpoint_port_parsing() {
        let connector = WsDeviceConnector;
        assert_eq!(connector.endpoint_port("ws://localhost:8886"), Some(8886));
        assert_eq!(connector.endpoint_port("wss://10.0.0.5:443/input"), Some(443));
        assert_eq!(connector.endpoint_port("ws://localhost"), None);
        assert_eq!(connector.endpoint_port("not a url"), None);
    }

    #[tokio::test]
    async fn test_invalid_url_is_transport_error() {
        let result = DeviceConnection::open("not-a-url", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LinkError::Transport(_))));
    }
}
