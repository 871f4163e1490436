//! Shared in-process WebSocket server for integration tests.
//!
//! Each test binary uses a subset of these helpers.
#![allow(dead_code)]

use serde_json::Value;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

pub type ServerWs = WebSocketStream<TcpStream>;

/// Installs the test tracing subscriber once per binary.
///
/// Honors `RUST_LOG`; output goes through the libtest capture writer.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Binds a listener and serves exactly one WebSocket connection with
/// the given handler. Returns the `ws://` URL to connect to.
pub async fn spawn_server<F, Fut>(handler: F) -> String
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
        handler(ws).await;
    });

    format!("ws://{addr}")
}

/// Reads the next JSON text frame, skipping control frames.
pub async fn next_json(ws: &mut ServerWs) -> Option<Value> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

pub async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("server send");
}
