//! End-to-end integration tests using real WebSocket clients.

use std::sync::Arc;
use std::time::Duration;

use beacon_server::BeaconServer;
use beacon_settings::{BeaconSettings, PublishScope};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn test_settings() -> BeaconSettings {
    let mut settings = BeaconSettings::default();
    settings.server.host = "127.0.0.1".into();
    settings.server.port = 0;
    settings
}

/// Boot a test server and return its base address + handle.
async fn boot_server(settings: BeaconSettings) -> (String, Arc<BeaconServer>) {
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let server = Arc::new(BeaconServer::new(&settings, metrics_handle));
    let (addr, _handle) = server.listen().await.unwrap();
    (addr.to_string(), server)
}

/// Connect and consume the `connection.established` greeting.
async fn connect(addr: &str) -> (WsStream, String) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let greeting = read_json(&mut ws).await;
    assert_eq!(greeting["type"], "connection.established");
    let id = greeting["data"]["connectionId"].as_str().unwrap().to_owned();
    (ws, id)
}

async fn send_event(ws: &mut WsStream, event_type: &str, data: Value) {
    let frame = json!({"type": event_type, "data": data}).to_string();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read the next text message, or `None` if nothing arrives in `wait`.
async fn try_read_json(ws: &mut WsStream, wait: Duration) -> Option<Value> {
    loop {
        match timeout(wait, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).ok(),
            Ok(Some(Ok(_))) => {}
            _ => return None,
        }
    }
}

/// Poll `cond` until it holds or the timeout elapses.
async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Wait until the client observes the socket closing.
async fn wait_for_close(ws: &mut WsStream) -> bool {
    loop {
        match timeout(TIMEOUT, ws.next()).await {
            Ok(Some(Ok(Message::Close(_)) | Err(_)) | None) => return true,
            Ok(Some(Ok(_))) => {}
            Err(_) => return false,
        }
    }
}

// ── Connection ──

#[tokio::test]
async fn greeting_carries_registered_connection_id() {
    let (addr, server) = boot_server(test_settings()).await;
    let (_ws, id) = connect(&addr).await;
    assert!(id.starts_with("conn_"));
    assert!(server.hub().get(&id).is_some());
}

#[tokio::test]
async fn connection_ids_are_unique() {
    let (addr, _server) = boot_server(test_settings()).await;
    let (_a, id_a) = connect(&addr).await;
    let (_b, id_b) = connect(&addr).await;
    assert_ne!(id_a, id_b);
}

// ── Fanout ──

#[tokio::test]
async fn publish_subscribe_disconnect_scenario() {
    let (addr, server) = boot_server(test_settings()).await;
    let engine = server.engine().clone();
    let (mut emitter, _) = connect(&addr).await;

    // No subscribers: cached, nothing delivered.
    send_event(&mut emitter, "updateLocation", json!({"vehicleId": "bus1", "lat": 1, "lon": 2})).await;
    assert!(wait_until(|| engine.last_position("bus1").is_some()).await);
    assert!(try_read_json(&mut emitter, Duration::from_millis(200)).await.is_none());

    // Subscribe syncs the cached position immediately.
    let (mut viewer, viewer_id) = connect(&addr).await;
    send_event(&mut viewer, "subscribeToVehicle", json!({"vehicleId": "bus1"})).await;
    let sync = read_json(&mut viewer).await;
    assert_eq!(sync["type"], "locationUpdate");
    assert_eq!(sync["data"], json!({"vehicleId": "bus1", "lat": 1, "lon": 2}));

    // Non-empty subscriber set: broadcast reaches every connection.
    send_event(&mut emitter, "updateLocation", json!({"vehicleId": "bus1", "lat": 3, "lon": 4})).await;
    let to_viewer = read_json(&mut viewer).await;
    let to_emitter = read_json(&mut emitter).await;
    assert_eq!(to_viewer["data"]["lat"], 3);
    assert_eq!(to_emitter["data"]["lon"], 4);

    // Disconnect releases the subscription.
    viewer.close(None).await.unwrap();
    assert!(wait_until(|| engine.subscriber_count("bus1") == 0).await);
    assert!(wait_until(|| server.hub().get(&viewer_id).is_none()).await);
    assert_eq!(engine.last_position("bus1").unwrap().get("lat"), Some(&json!(3)));
}

#[tokio::test]
async fn subscribe_without_cached_position_sends_nothing() {
    let (addr, server) = boot_server(test_settings()).await;
    let (mut viewer, viewer_id) = connect(&addr).await;
    send_event(&mut viewer, "subscribeToVehicle", json!({"vehicleId": "ghost"})).await;
    assert!(wait_until(|| server.engine().is_subscribed("ghost", &viewer_id)).await);
    assert!(try_read_json(&mut viewer, Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn unsubscribe_stops_targeted_delivery() {
    let mut settings = test_settings();
    settings.fanout.publish_scope = PublishScope::Subscribers;
    let (addr, server) = boot_server(settings).await;
    let engine = server.engine().clone();
    let (mut emitter, _) = connect(&addr).await;
    let (mut viewer, viewer_id) = connect(&addr).await;

    send_event(&mut viewer, "subscribeToVehicle", json!({"vehicleId": "bus7"})).await;
    assert!(wait_until(|| engine.is_subscribed("bus7", &viewer_id)).await);

    send_event(&mut emitter, "updateLocation", json!({"vehicleId": "bus7", "lat": 5})).await;
    assert_eq!(read_json(&mut viewer).await["data"]["lat"], 5);
    // The emitter is not subscribed, so nothing comes back to it.
    assert!(try_read_json(&mut emitter, Duration::from_millis(200)).await.is_none());

    send_event(&mut viewer, "unsubscribeFromVehicle", json!({"vehicleId": "bus7"})).await;
    assert!(wait_until(|| !engine.is_subscribed("bus7", &viewer_id)).await);
    send_event(&mut emitter, "updateLocation", json!({"vehicleId": "bus7", "lat": 6})).await;
    assert!(wait_until(|| {
        engine.last_position("bus7").and_then(|p| p.get("lat").cloned()) == Some(json!(6))
    })
    .await);
    assert!(try_read_json(&mut viewer, Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn updates_arrive_in_publish_order() {
    let (addr, _server) = boot_server(test_settings()).await;
    let (mut emitter, _) = connect(&addr).await;
    let (mut viewer, _) = connect(&addr).await;
    send_event(&mut viewer, "subscribeToVehicle", json!({"vehicleId": "bus1"})).await;

    for seq in 0..20 {
        send_event(&mut emitter, "updateLocation", json!({"vehicleId": "bus1", "seq": seq})).await;
    }
    // Updates sent before the subscribe landed are not delivered; whatever
    // does arrive must be strictly increasing and end with the last one.
    let mut last = -1;
    loop {
        let msg = read_json(&mut viewer).await;
        let seq = msg["data"]["seq"].as_i64().unwrap();
        assert!(seq > last, "out of order: {seq} after {last}");
        last = seq;
        if seq == 19 {
            break;
        }
    }
}

// ── Robustness ──

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let (addr, server) = boot_server(test_settings()).await;
    let (mut ws, id) = connect(&addr).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    ws.send(Message::Text(r#"{"type":"teleport","data":{}}"#.into())).await.unwrap();
    send_event(&mut ws, "updateLocation", json!({"lat": 1})).await;
    send_event(&mut ws, "updateLocation", json!({"vehicleId": 42})).await;
    send_event(&mut ws, "subscribeToVehicle", json!({})).await;
    ws.send(Message::Binary(vec![0xff, 0xfe].into())).await.unwrap();

    // The connection survives and nothing was stored.
    assert!(try_read_json(&mut ws, Duration::from_millis(200)).await.is_none());
    assert!(server.hub().get(&id).is_some());
    assert!(server.engine().tracked_vehicles().is_empty());

    // Still usable afterwards.
    send_event(&mut ws, "updateLocation", json!({"vehicleId": "bus1"})).await;
    assert!(wait_until(|| server.engine().last_position("bus1").is_some()).await);
}

#[tokio::test]
async fn binary_json_frames_are_accepted() {
    let (addr, server) = boot_server(test_settings()).await;
    let (mut ws, _) = connect(&addr).await;
    let frame = json!({"type": "updateLocation", "data": {"vehicleId": "van3"}}).to_string();
    ws.send(Message::Binary(frame.into_bytes().into())).await.unwrap();
    assert!(wait_until(|| server.engine().last_position("van3").is_some()).await);
}

#[tokio::test]
async fn dropping_the_socket_releases_subscriptions() {
    let (addr, server) = boot_server(test_settings()).await;
    let engine = server.engine().clone();
    let (mut ws, id) = connect(&addr).await;
    send_event(&mut ws, "subscribeToVehicle", json!({"vehicleId": "bus1"})).await;
    send_event(&mut ws, "subscribeToVehicle", json!({"vehicleId": "bus2"})).await;
    assert!(wait_until(|| engine.subscriptions_of(&id).len() == 2).await);

    drop(ws);
    assert!(wait_until(|| engine.subscriptions_of(&id).is_empty()).await);
    assert!(wait_until(|| server.hub().connection_count() == 0).await);
}

#[tokio::test]
async fn silent_client_times_out() {
    let mut settings = test_settings();
    settings.server.heartbeat_interval_ms = 50;
    settings.server.heartbeat_timeout_ms = 150;
    let (addr, server) = boot_server(settings).await;
    let (ws, id) = connect(&addr).await;
    // Never reading means pings are never answered.
    assert!(wait_until(|| server.hub().get(&id).is_none()).await);
    drop(ws);
}

#[tokio::test]
async fn upgrades_beyond_the_cap_are_refused() {
    let mut settings = test_settings();
    settings.server.max_connections = 1;
    let (addr, _server) = boot_server(settings).await;
    let (_first, _) = connect(&addr).await;

    let err = connect_async(format!("ws://{addr}/ws")).await.unwrap_err();
    match err {
        WsError::Http(resp) => assert_eq!(resp.status(), 503),
        other => panic!("expected HTTP refusal, got {other:?}"),
    }
}

#[tokio::test]
async fn simultaneous_upgrades_respect_the_cap() {
    let mut settings = test_settings();
    settings.server.max_connections = 2;
    let (addr, server) = boot_server(settings).await;
    let url = format!("ws://{addr}/ws");

    let attempts = futures::future::join_all((0..6).map(|_| connect_async(url.clone()))).await;
    let mut open = Vec::new();
    for attempt in attempts {
        match attempt {
            Ok((ws, _)) => open.push(ws),
            Err(WsError::Http(resp)) => assert_eq!(resp.status(), 503),
            Err(other) => panic!("unexpected connect error: {other:?}"),
        }
    }
    assert_eq!(open.len(), 2);
    assert_eq!(server.available_slots(), 0);

    // Closing a session frees its slot.
    drop(open.pop());
    assert!(wait_until(|| server.available_slots() == 1).await);
    let (_again, _) = connect(&addr).await;
}

#[tokio::test]
async fn shutdown_closes_open_sessions() {
    let (addr, server) = boot_server(test_settings()).await;
    let (mut ws, id) = connect(&addr).await;
    send_event(&mut ws, "subscribeToVehicle", json!({"vehicleId": "bus1"})).await;
    assert!(wait_until(|| server.engine().is_subscribed("bus1", &id)).await);

    server.shutdown().shutdown();
    assert!(wait_for_close(&mut ws).await);
    assert!(wait_until(|| server.hub().connection_count() == 0).await);
    assert_eq!(server.engine().subscriber_count("bus1"), 0);
}

// ── HTTP ──

#[tokio::test]
async fn http_banner_and_health() {
    let (addr, _server) = boot_server(test_settings()).await;
    let (_ws, _) = connect(&addr).await;

    let banner = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(banner.status(), 200);
    assert_eq!(banner.text().await.unwrap(), "GPS tracking relay online");

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
}
