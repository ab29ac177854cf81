//! End-to-end relay tests: real server on a loopback port, real WebSocket
//! clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use banjir_relay::{
    serve_with_shutdown, AppState, HttpThresholdSource, HubConfig, StaticThresholds, ThresholdError,
    ThresholdPair, ThresholdSource,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULTS: ThresholdPair = ThresholdPair {
    normal: 100,
    banjir: 80,
};

struct Relay {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Relay {
    async fn start(source: Arc<dyn ThresholdSource>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let state = AppState::new(source, DEFAULTS, HubConfig::default());
        tokio::spawn(serve_with_shutdown(listener, state, async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            shutdown: Some(tx),
        }
    }

    async fn with_defaults() -> Self {
        Self::start(Arc::new(StaticThresholds(DEFAULTS))).await
    }

    async fn connect(&self) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws", self.addr)).await.unwrap();
        client
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Next text frame as JSON
async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(STEP_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip frames until a connection count of `n` arrives
async fn wait_for_count(client: &mut Client, n: u64) {
    loop {
        let frame = next_json(client).await;
        if frame["type"] == "connection" && frame["connection_count"] == n {
            return;
        }
    }
}

/// Next frame that is not a connection count
async fn next_payload(client: &mut Client) -> Value {
    loop {
        let frame = next_json(client).await;
        if frame["type"] != "connection" {
            return frame;
        }
    }
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_string())).await.unwrap();
}

/// Connect `n` clients and wait until each has seen the full count
async fn connect_all(relay: &Relay, n: u64) -> Vec<Client> {
    let mut clients = Vec::new();
    for _ in 0..n {
        clients.push(relay.connect().await);
    }
    for client in clients.iter_mut() {
        wait_for_count(client, n).await;
    }
    clients
}

#[tokio::test]
async fn test_reading_is_classified_and_relayed() {
    let relay = Relay::with_defaults().await;
    let mut clients = connect_all(&relay, 3).await;

    send(
        &mut clients[0],
        r#"{"type":"data","hardwareId":"SENSOR-7","elevation":75,"curah_hujan":30,"latitude":-6.9,"longitude":107.6}"#,
    )
    .await;

    for peer in clients[1..].iter_mut() {
        let frame = next_payload(peer).await;
        assert_eq!(frame["type"], "data");
        assert_eq!(frame["hardwareId"], "SENSOR-7");
        assert_eq!(frame["elevation"], 75);
        assert_eq!(frame["curah_hujan"], 30);
        assert_eq!(frame["status_elevation"], "Banjir");
        assert_eq!(frame["status_curah_hujan"], "Hujan sedang");
        assert_eq!(frame["latitude"], -6.9);
        assert!(frame["timestamp"].as_str().unwrap().ends_with("UTC"));
    }
}

#[tokio::test]
async fn test_sender_does_not_receive_own_reading() {
    let relay = Relay::with_defaults().await;
    let mut clients = connect_all(&relay, 2).await;

    send(&mut clients[0], r#"{"type":"data","elevation":150,"curah_hujan":0}"#).await;
    let relayed = next_payload(&mut clients[1]).await;
    assert_eq!(relayed["status_elevation"], "Normal");

    // Time messages reach everyone, so the sender's next payload must be this one
    let time = r#"{"type":"time","timeReady":"07:00"}"#;
    send(&mut clients[0], time).await;

    let own = next_payload(&mut clients[0]).await;
    assert_eq!(own, serde_json::from_str::<Value>(time).unwrap());
    let peer = next_payload(&mut clients[1]).await;
    assert_eq!(peer["timeReady"], "07:00");
}

#[tokio::test]
async fn test_time_message_relayed_verbatim() {
    let relay = Relay::with_defaults().await;
    let mut clients = connect_all(&relay, 2).await;

    let time = r#"{"type":"time","timeReady":{"hour":7,"minute":30},"extra":true}"#;
    send(&mut clients[1], time).await;

    loop {
        let msg = tokio::time::timeout(STEP_TIMEOUT, clients[0].next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            if text.contains("\"time\"") {
                assert_eq!(text, time);
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let relay = Relay::with_defaults().await;
    let mut clients = connect_all(&relay, 2).await;

    send(&mut clients[0], "not json").await;
    send(&mut clients[0], r#"{"type":"data","elevation":"high","curah_hujan":30}"#).await;
    send(&mut clients[0], r#"{"elevation":75,"curah_hujan":30}"#).await;
    send(&mut clients[0], r#"{"type":"data","elevation":90,"curah_hujan":5}"#).await;

    // Only the valid reading comes through, and the session is still alive
    let frame = next_payload(&mut clients[1]).await;
    assert_eq!(frame["elevation"], 90);
    assert_eq!(frame["status_elevation"], "Siaga");
    assert_eq!(frame["status_curah_hujan"], "Hujan ringan");
}

#[tokio::test]
async fn test_binary_frames_are_decoded() {
    let relay = Relay::with_defaults().await;
    let mut clients = connect_all(&relay, 2).await;

    clients[0]
        .send(Message::Binary(
            br#"{"type":"data","elevation":80,"curah_hujan":50}"#.to_vec(),
        ))
        .await
        .unwrap();

    // The reading is relayed with the frame type it arrived in
    let frame = loop {
        let msg = tokio::time::timeout(STEP_TIMEOUT, clients[1].next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Binary(bytes) = msg {
            break serde_json::from_slice::<Value>(&bytes).unwrap();
        }
    };
    assert_eq!(frame["type"], "data");
    assert_eq!(frame["status_elevation"], "Siaga");
    assert_eq!(frame["status_curah_hujan"], "Hujan deras");
}

#[tokio::test]
async fn test_connection_count_after_concurrent_connects() {
    let relay = Relay::with_defaults().await;

    let mut clients =
        futures_util::future::join_all((0..6).map(|_| relay.connect())).await;

    for client in clients.iter_mut() {
        wait_for_count(client, 6).await;
    }
}

#[tokio::test]
async fn test_disconnect_announces_new_count() {
    let relay = Relay::with_defaults().await;
    let mut clients = connect_all(&relay, 3).await;

    let mut leaving = clients.pop().unwrap();
    leaving.close(None).await.unwrap();

    for client in clients.iter_mut() {
        wait_for_count(client, 2).await;
    }

    // Dropping the transport without a close frame counts too
    drop(clients.pop());
    wait_for_count(&mut clients[0], 1).await;
}

struct FixedSource(ThresholdPair);

#[async_trait]
impl ThresholdSource for FixedSource {
    async fn fetch(&self) -> Result<ThresholdPair, ThresholdError> {
        Ok(self.0)
    }
}

#[tokio::test]
async fn test_fetched_thresholds_override_defaults() {
    let source = FixedSource(ThresholdPair {
        normal: 50,
        banjir: 20,
    });
    let relay = Relay::start(Arc::new(source)).await;
    let mut clients = connect_all(&relay, 2).await;

    // 75 is Banjir under the defaults but Normal under the fetched pair
    send(&mut clients[0], r#"{"type":"data","elevation":75,"curah_hujan":0}"#).await;
    let frame = next_payload(&mut clients[1]).await;
    assert_eq!(frame["status_elevation"], "Normal");
}

#[tokio::test]
async fn test_unreachable_threshold_endpoint_falls_back() {
    let source = HttpThresholdSource::new("http://127.0.0.1:9/api/level", Duration::from_secs(1)).unwrap();
    let relay = Relay::start(Arc::new(source)).await;
    let mut clients = connect_all(&relay, 2).await;

    send(&mut clients[0], r#"{"type":"data","elevation":85,"curah_hujan":20}"#).await;
    let frame = next_payload(&mut clients[1]).await;
    assert_eq!(frame["status_elevation"], "Siaga");
    assert_eq!(frame["status_curah_hujan"], "Hujan sedang");
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let mut relay = Relay::with_defaults().await;
    let mut clients = connect_all(&relay, 2).await;

    relay.stop();

    for client in clients.iter_mut() {
        let closed = tokio::time::timeout(STEP_TIMEOUT, async {
            loop {
                match client.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "session was not closed on shutdown");
    }
}

struct SlowSource;

#[async_trait]
impl ThresholdSource for SlowSource {
    async fn fetch(&self) -> Result<ThresholdPair, ThresholdError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(DEFAULTS)
    }
}

#[tokio::test]
async fn test_shutdown_while_waiting_for_thresholds() {
    let mut relay = Relay::start(Arc::new(SlowSource)).await;
    let mut client = relay.connect().await;
    wait_for_count(&mut client, 1).await;

    send(&mut client, r#"{"type":"data","elevation":75,"curah_hujan":30}"#).await;
    // Let the session block on the pending fetch
    tokio::time::sleep(Duration::from_millis(200)).await;
    relay.stop();

    let closed = tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "session stayed open while its threshold fetch was pending");
}

#[tokio::test]
async fn test_health_reports_connections() {
    let relay = Relay::with_defaults().await;
    let _clients = connect_all(&relay, 2).await;

    let health: Value = reqwest::get(format!("http://{}/health", relay.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["status"], "healthy");
    assert_eq!(health["connections"], 2);
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}
