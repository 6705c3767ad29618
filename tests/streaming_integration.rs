//! End-to-end tests over a real WebSocket connection.

use futures::{SinkExt, StreamExt};
use glove_stream::classifier::MockClassifier;
use glove_stream::config::Config;
use glove_stream::stream::coordinator::Coordinator;
use glove_stream::stream::server::{router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(config: Config) -> SocketAddr {
    let coordinator = Coordinator::new(
        Arc::new(MockClassifier::default()),
        config.server.inference_workers,
        config.server.mailbox_notify_capacity,
    );
    coordinator.spawn_workers();
    let state = AppState {
        coordinator,
        config: Arc::new(config),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/stream"))
        .await
        .unwrap();
    ws
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.server.rate_limit_interval_ms = 0;
    config.pipeline.calibration_samples_needed = 3;
    config
}

fn valid_frame(ts: f64) -> String {
    let values: Vec<f64> = (0..11).map(|i| 100.0 + i as f64).collect();
    format!(r#"{{"right": {values:?}, "timestamp": {ts}}}"#)
}

/// Read JSON messages until one arrives that is not a status envelope.
async fn next_non_status(ws: &mut WsClient) -> serde_json::Value {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            let msg = ws.next().await.unwrap().unwrap();
            if let Message::Text(text) = msg {
                let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                if value.get("status").is_none() {
                    return value;
                }
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn valid_frame_yields_prediction() {
    let addr = spawn_server(test_config()).await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text(valid_frame(1.0).into()))
        .await
        .unwrap();

    let response = next_non_status(&mut ws).await;
    let prediction = response["prediction"].as_str().unwrap();
    assert!(!prediction.is_empty());
    let confidence = response["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert_eq!(response["timestamp"].as_f64().unwrap(), 1.0);
}

#[tokio::test]
async fn first_message_is_calibrating_status() {
    let addr = spawn_server(test_config()).await;
    let mut ws = connect(addr).await;

    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = msg.into_text().unwrap();
    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(value["status"], "calibrating");
    assert_eq!(value["needed"], 3);
}

#[tokio::test]
async fn wrong_arity_yields_error_and_connection_survives() {
    let addr = spawn_server(test_config()).await;
    let mut ws = connect(addr).await;

    let nine: Vec<f64> = (0..9).map(|i| i as f64).collect();
    ws.send(Message::Text(
        format!(r#"{{"right": {nine:?}, "timestamp": 1.0}}"#).into(),
    ))
    .await
    .unwrap();

    let response = next_non_status(&mut ws).await;
    assert!(response["error"].as_str().is_some());

    // The connection remains usable for a subsequent valid frame.
    ws.send(Message::Text(valid_frame(2.0).into()))
        .await
        .unwrap();
    let response = next_non_status(&mut ws).await;
    assert!(response["prediction"].as_str().is_some());
}

#[tokio::test]
async fn dual_hand_frame_yields_dual_prediction() {
    let addr = spawn_server(test_config()).await;
    let mut ws = connect(addr).await;

    let values: Vec<f64> = (0..11).map(|i| 10.0 * i as f64).collect();
    ws.send(Message::Text(
        format!(
            r#"{{"left": {values:?}, "right": {values:?}, "language": "en", "timestamp": 3.0}}"#
        )
        .into(),
    ))
    .await
    .unwrap();

    let response = next_non_status(&mut ws).await;
    assert!(response["left_prediction"].as_str().is_some());
    assert!(response["right_prediction"].as_str().is_some());
    assert_eq!(response["timestamp"].as_f64().unwrap(), 3.0);
}

#[tokio::test]
async fn rate_limited_frames_get_no_response() {
    let mut config = test_config();
    // An hour-long interval: only the first frame is ever accepted.
    config.server.rate_limit_interval_ms = 3_600_000;
    let addr = spawn_server(config).await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text(valid_frame(1.0).into()))
        .await
        .unwrap();
    ws.send(Message::Text(valid_frame(2.0).into()))
        .await
        .unwrap();

    // Exactly one prediction comes back, for the first frame.
    let response = next_non_status(&mut ws).await;
    assert_eq!(response["timestamp"].as_f64().unwrap(), 1.0);

    // No further traffic for the dropped frame.
    let extra = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(extra.is_err(), "rate-limited frame produced a response");
}

#[tokio::test]
async fn calibration_completion_is_surfaced() {
    let addr = spawn_server(test_config()).await;
    let mut ws = connect(addr).await;

    for i in 0..3 {
        ws.send(Message::Text(valid_frame(i as f64).into()))
            .await
            .unwrap();
    }

    // Among the responses there is a {"status": "ready"} envelope.
    let mut saw_ready = false;
    for _ in 0..8 {
        let msg = match tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => text,
            _ => break,
        };
        let value: serde_json::Value = serde_json::from_str(msg.as_str()).unwrap();
        if value.get("status").map(|s| s == "ready").unwrap_or(false) {
            saw_ready = true;
            break;
        }
    }
    assert!(saw_ready, "no ready status after calibration frames");
}
