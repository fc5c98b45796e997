//! E2E tests for Gateway WebSocket and HTTP API

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::{SinkExt, StreamExt};
use searchbus_backend::InMemoryBackend;
use searchbus_gateway::{
    build_routes, AppState, BootstrapState, Dispatcher, LocalBus, MessageBus,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn spawn_gateway_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let bus = LocalBus::new();
    bus.register(
        "realtime/search",
        Arc::new(Dispatcher::new(Arc::new(InMemoryBackend::new()))),
    )
    .await
    .expect("register dispatcher");
    let (_ready, readiness) = watch::channel(BootstrapState::Ready);
    let state = AppState::new(
        Arc::new(bus),
        "realtime/search",
        Duration::from_secs(1),
        readiness,
    );

    let app: Router = build_routes(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve gateway app");
    });

    (addr, handle)
}

#[tokio::test]
#[ignore = "starts network listeners"]
async fn gateway_health_check() {
    let (addr, _server_handle) = spawn_gateway_server().await;

    let http = reqwest::Client::new();
    let response = http
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .expect("health check request");

    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore = "starts network listeners"]
async fn gateway_websocket_index_and_get() {
    let (addr, server_handle) = spawn_gateway_server().await;

    let ws_url = format!("ws://{}/ws", addr);
    let (mut ws, _resp) = connect_async(ws_url).await.expect("connect websocket");

    let frames = [
        json!({"id": "index-1", "body": {
            "action": "index",
            "_index": "test_index",
            "_type": "test_type",
            "_id": "test_id",
            "source": {"user": "larry", "message": "中华人民共和国"},
        }}),
        json!({"id": "get-1", "body": {
            "action": "get",
            "_index": "test_index",
            "_type": "test_type",
            "_id": "test_id",
        }}),
    ];

    let mut replies = Vec::new();
    for frame in frames {
        ws.send(Message::Text(frame.to_string().into()))
            .await
            .expect("send ws message");

        let response = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("wait ws response")
            .expect("ws should produce a message")
            .expect("ws message should be ok");

        match response {
            Message::Text(text) => {
                replies.push(serde_json::from_str::<Value>(&text).expect("reply frame json"));
            }
            other => panic!("unexpected ws frame: {other:?}"),
        }
    }

    assert_eq!(replies[0]["status"], "ok");
    assert_eq!(replies[0]["id"], "index-1");
    assert_eq!(replies[0]["body"]["created"], true);
    assert_eq!(replies[1]["id"], "get-1");
    assert_eq!(replies[1]["body"]["_source"]["user"], "larry");

    server_handle.abort();
}
