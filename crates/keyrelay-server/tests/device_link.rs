//! Device connection tests over real loopback WebSockets.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use keyrelay_core::{encode_press, encode_release, ConnectionState, Modifiers};
use keyrelay_server::application::{DeviceLink, DeviceRegistry, LinkError};
use keyrelay_server::infrastructure::{DeviceConnection, WsDeviceConnector};
use tokio::net::TcpListener;

use common::{press, release, FakeDevice, WAIT};

#[tokio::test]
async fn test_open_records_metadata_and_delivers_reports() {
    // Arrange
    let mut device = FakeDevice::start(r#"{"model":"Pixel 7"}"#).await;
    let mut conn = DeviceConnection::open(&device.url, WAIT).await.unwrap();

    // Act
    conn.send(&encode_press("a", Modifiers::NONE.with_ctrl()).unwrap())
        .await
        .unwrap();
    conn.send(&encode_release()).await.unwrap();

    // Assert
    assert_eq!(conn.metadata(), Some(r#"{"model":"Pixel 7"}"#));
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(device.next_report().await, press(0x01, 0x04));
    assert_eq!(device.next_report().await, release());
}

#[tokio::test]
async fn test_unresponsive_endpoint_times_out_within_bound() {
    // Arrange: a listener that never completes the WebSocket handshake
    let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", silent.local_addr().unwrap());
    let bound = Duration::from_millis(300);

    // Act
    let started = Instant::now();
    let result = DeviceConnection::open(&url, bound).await;
    let elapsed = started.elapsed();

    // Assert
    assert!(matches!(result, Err(LinkError::Timeout { .. })));
    assert!(elapsed >= bound);
    assert!(elapsed < bound + Duration::from_millis(500), "took {elapsed:?}");
}

#[tokio::test]
async fn test_closed_port_is_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let result = DeviceConnection::open(&url, WAIT).await;

    assert!(matches!(result, Err(LinkError::Refused { .. })));
}

#[tokio::test]
async fn test_device_closing_before_metadata_is_rejected() {
    let device = FakeDevice::start_mute().await;

    let result = DeviceConnection::open(&device.url, WAIT).await;

    assert!(matches!(result, Err(LinkError::NoMetadata { .. })));
}

#[tokio::test]
async fn test_close_is_idempotent_and_send_then_fails_fast() {
    let device = FakeDevice::start("meta").await;
    let mut conn = DeviceConnection::open(&device.url, WAIT).await.unwrap();

    conn.close().await;
    conn.close().await;

    assert_eq!(conn.state(), ConnectionState::Disconnected);
    let result = conn.send(&encode_release()).await;
    assert_eq!(result, Err(LinkError::Disconnected));
}

#[tokio::test]
async fn test_remote_hang_up_fires_closed_signal() {
    // Arrange
    let mut device = FakeDevice::start("meta").await;
    let mut conn = DeviceConnection::open(&device.url, WAIT).await.unwrap();
    let closed = conn.take_closed_signal().unwrap();
    assert!(conn.take_closed_signal().is_none());

    // Act
    device.hang_up();

    // Assert
    tokio::time::timeout(WAIT, closed).await.unwrap().unwrap();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert_eq!(conn.send(&encode_release()).await, Err(LinkError::Disconnected));
}

#[tokio::test]
async fn test_registry_connect_all_isolates_unreachable_device() {
    // Arrange: one live device, one refused port
    let live = FakeDevice::start(r#"{"serial":"live"}"#).await;
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_url = format!("ws://{}", dead.local_addr().unwrap());
    drop(dead);

    let registry = Arc::new(DeviceRegistry::new(Arc::new(WsDeviceConnector)));
    registry.add("live", "Live", live.url.as_str()).unwrap();
    registry.add("dead", "Dead", dead_url.as_str()).unwrap();

    // Act
    let report = registry.connect_all(Duration::from_secs(1)).await;

    // Assert
    assert!(!report.all_succeeded);
    assert_eq!(report.connected_count(), 1);
    let live_summary = registry.get("live").unwrap();
    assert!(live_summary.connected());
    assert_eq!(live_summary.metadata.as_deref(), Some(r#"{"serial":"live"}"#));
    assert!(!registry.get("dead").unwrap().connected());
}

#[tokio::test]
async fn test_registry_marks_device_disconnected_on_hang_up() {
    let mut device = FakeDevice::start("meta").await;
    let registry = Arc::new(DeviceRegistry::new(Arc::new(WsDeviceConnector)));
    registry.add("d", "D", device.url.as_str()).unwrap();
    registry.connect("d", WAIT).await.unwrap();

    device.hang_up();

    let deadline = Instant::now() + WAIT;
    while registry.get("d").unwrap().connected() {
        assert!(Instant::now() < deadline, "device never marked disconnected");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
