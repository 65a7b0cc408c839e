//! Shared helpers for the keyrelay-server integration tests.
//!
//! [`FakeDevice`] plays the device side: a WebSocket server on an ephemeral
//! loopback port that sends one metadata message on connect and then decodes
//! every binary frame it receives as a [`KeyReport`].

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use keyrelay_core::protocol::{CodecError, UHID_KEYBOARD_MSG_TYPE};
use keyrelay_core::KeyReport;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const WAIT: Duration = Duration::from_secs(3);

pub struct FakeDevice {
    pub url: String,
    reports: mpsc::UnboundedReceiver<Result<KeyReport, CodecError>>,
    hang_up: Option<oneshot::Sender<()>>,
}

impl FakeDevice {
    /// Starts a device that sends `metadata` right after the handshake.
    pub async fn start(metadata: &str) -> Self {
        Self::spawn(Some(metadata.to_string())).await
    }

    /// Starts a device that completes the handshake and then closes without
    /// sending anything.
    pub async fn start_mute() -> Self {
        Self::spawn(None).await
    }

    async fn spawn(metadata: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (report_tx, reports) = mpsc::unbounded_channel();
        let (hang_up_tx, mut hang_up_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let Some(metadata) = metadata else {
                let _ = ws.close(None).await;
                return;
            };
            ws.send(Message::Text(metadata)).await.unwrap();
            loop {
                tokio::select! {
                    _ = &mut hang_up_rx => {
                        let _ = ws.close(None).await;
                        break;
                    }
                    frame = ws.next() => match frame {
                        Some(Ok(Message::Binary(bytes))) => {
                            let _ = report_tx.send(KeyReport::decode(&bytes));
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self {
            url,
            reports,
            hang_up: Some(hang_up_tx),
        }
    }

    /// Next report the device received.  Panics on a frame that is not a
    /// well-formed keyboard report.
    pub async fn next_report(&mut self) -> KeyReport {
        tokio::time::timeout(WAIT, self.reports.recv())
            .await
            .expect("timed out waiting for a report")
            .expect("device task ended")
            .expect("device received a malformed report")
    }

    /// Waits briefly and returns everything received so far.
    pub async fn drain_reports(&mut self, settle: Duration) -> Vec<KeyReport> {
        tokio::time::sleep(settle).await;
        let mut all = Vec::new();
        while let Ok(report) = self.reports.try_recv() {
            all.push(report.expect("device received a malformed report"));
        }
        all
    }

    /// Closes the device side of the connection.
    pub fn hang_up(&mut self) {
        if let Some(tx) = self.hang_up.take() {
            let _ = tx.send(());
        }
    }
}

/// The press report for `keycode` with `mask`, built from its wire bytes.
pub fn press(mask: u8, keycode: u8) -> KeyReport {
    KeyReport::decode(&[UHID_KEYBOARD_MSG_TYPE, mask, 0, keycode, 0, 0, 0, 0, 0]).unwrap()
}

pub fn release() -> KeyReport {
    KeyReport::decode(&[UHID_KEYBOARD_MSG_TYPE, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap()
}
