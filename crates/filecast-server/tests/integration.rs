//! End-to-end tests against a real listener using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use filecast_server::config::ServerConfig;
use filecast_server::server::RelayServer;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a relay on an ephemeral port and return the WS URL plus the server.
async fn boot_server() -> (String, Arc<RelayServer>) {
    let config = ServerConfig {
        write_timeout: Duration::from_secs(1),
        ..ServerConfig::default()
    };
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let server = Arc::new(RelayServer::new(config, metrics_handle));
    let (addr, _handle) = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

/// Connect and wait until the server has registered the new client.
async fn connect(url: &str, server: &RelayServer) -> WsStream {
    let before = server.registry().connection_count();
    let (ws, _) = connect_async(url).await.unwrap();
    wait_for_count(server, before + 1).await;
    ws
}

async fn wait_for_count(server: &RelayServer, expected: usize) {
    timeout(TIMEOUT, async {
        while server.registry().connection_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {expected} connections, have {}",
            server.registry().connection_count()
        )
    });
}

async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next text frame as JSON, skipping control frames.
async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("transport error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert nothing but control frames arrive within `wait`.
async fn assert_silent(ws: &mut WsStream, wait: Duration) {
    if let Ok(Some(Ok(msg))) = timeout(wait, ws.next()).await {
        assert!(
            !matches!(msg, Message::Text(_) | Message::Binary(_)),
            "unexpected data frame: {msg:?}"
        );
    }
}

#[tokio::test]
async fn message_reaches_sender_and_peer() {
    let (url, server) = boot_server().await;
    let mut a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;

    let msg = json!({"content": "hi", "fileExtension": "txt"});
    send_json(&mut a, &msg).await;

    assert_eq!(recv_json(&mut a).await, msg);
    assert_eq!(recv_json(&mut b).await, msg);
}

#[tokio::test]
async fn unknown_fields_are_dropped_on_rebroadcast() {
    let (url, server) = boot_server().await;
    let mut a = connect(&url, &server).await;

    send_json(
        &mut a,
        &json!({"content": "x", "fileExtension": "rs", "author": "someone"}),
    )
    .await;

    assert_eq!(
        recv_json(&mut a).await,
        json!({"content": "x", "fileExtension": "rs"})
    );
}

#[tokio::test]
async fn binary_frame_is_decoded_as_json() {
    let (url, server) = boot_server().await;
    let mut a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;

    let payload = br#"{"content":"bin","fileExtension":"md"}"#.to_vec();
    a.send(Message::Binary(payload.into())).await.unwrap();

    assert_eq!(recv_json(&mut b).await["content"], "bin");
}

#[tokio::test]
async fn malformed_payload_tears_down_sender_only() {
    let (url, server) = boot_server().await;
    let mut a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;

    a.send(Message::Text("not json".into())).await.unwrap();
    wait_for_count(&server, 1).await;

    // Nothing was broadcast to the surviving client.
    assert_silent(&mut b, Duration::from_millis(200)).await;

    // A's socket is closed by the server.
    let closed = timeout(TIMEOUT, async {
        loop {
            match a.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "sender socket should be closed");

    // The relay keeps working for everyone else.
    let msg = json!({"content": "still here", "fileExtension": "txt"});
    send_json(&mut b, &msg).await;
    assert_eq!(recv_json(&mut b).await, msg);
}

#[tokio::test]
async fn missing_field_is_malformed() {
    let (url, server) = boot_server().await;
    let mut a = connect(&url, &server).await;

    send_json(&mut a, &json!({"content": "no extension"})).await;
    wait_for_count(&server, 0).await;
}

#[tokio::test]
async fn broken_client_is_removed_and_others_still_receive() {
    let (url, server) = boot_server().await;
    let mut a = connect(&url, &server).await;
    let b = connect(&url, &server).await;
    let mut c = connect(&url, &server).await;

    // Break B's transport without a close handshake.
    drop(b);

    let msg = json!({"content": "after break", "fileExtension": "txt"});
    send_json(&mut a, &msg).await;

    assert_eq!(recv_json(&mut a).await, msg);
    assert_eq!(recv_json(&mut c).await, msg);
    wait_for_count(&server, 2).await;
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
    let (url, server) = boot_server().await;
    let mut sender = connect(&url, &server).await;
    let mut observer = connect(&url, &server).await;

    for n in 0..25 {
        send_json(
            &mut sender,
            &json!({"content": format!("m{n}"), "fileExtension": "txt"}),
        )
        .await;
    }

    for n in 0..25 {
        assert_eq!(recv_json(&mut observer).await["content"], format!("m{n}"));
    }
    for n in 0..25 {
        assert_eq!(recv_json(&mut sender).await["content"], format!("m{n}"));
    }
}

#[tokio::test]
async fn interleaved_senders_share_one_order() {
    let (url, server) = boot_server().await;
    let mut a = connect(&url, &server).await;
    let mut b = connect(&url, &server).await;
    let mut c = connect(&url, &server).await;

    for n in 0..10 {
        let (ws, tag) = if n % 2 == 0 { (&mut a, "a") } else { (&mut b, "b") };
        send_json(ws, &json!({"content": format!("{tag}{n}"), "fileExtension": "txt"})).await;
    }

    let mut orders = Vec::new();
    for ws in [&mut a, &mut b, &mut c] {
        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(recv_json(ws).await["content"].as_str().unwrap().to_string());
        }
        orders.push(seen);
    }
    assert_eq!(orders[0], orders[1]);
    assert_eq!(orders[1], orders[2]);
}

#[tokio::test]
async fn orderly_close_deregisters() {
    let (url, server) = boot_server().await;
    let mut a = connect(&url, &server).await;
    let _b = connect(&url, &server).await;

    a.close(None).await.unwrap();
    wait_for_count(&server, 1).await;
}

#[tokio::test]
async fn health_reports_connections() {
    let (url, server) = boot_server().await;
    let _a = connect(&url, &server).await;

    let addr = url.trim_start_matches("ws://").trim_end_matches("/ws");
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes())
        .await
        .unwrap();
    let mut response = String::new();
    let _ = timeout(
        TIMEOUT,
        tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = response.split("\r\n\r\n").nth(1).unwrap();
    let parsed: Value = serde_json::from_str(body).unwrap();
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["connections"], 1);
}

#[tokio::test]
async fn shutdown_closes_clients_and_stops_server() {
    let config = ServerConfig::default();
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let server = RelayServer::new(config, metrics_handle);
    let (addr, handle) = server.listen().await.unwrap();
    let url = format!("ws://{addr}/ws");
    let mut a = connect(&url, &server).await;

    server.shutdown().shutdown();
    timeout(TIMEOUT, handle)
        .await
        .expect("server did not stop")
        .unwrap();

    wait_for_count(&server, 0).await;
    let ended = timeout(TIMEOUT, async {
        loop {
            match a.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}
