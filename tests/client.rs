//! Integration tests for the protocol client against an in-process
//! WebSocket server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;

use vibium::{Client, Error};

use common::{next_json, send_json, spawn_server};

// ============================================================================
// Scenario A: plain request/response
// ============================================================================

#[tokio::test]
async fn send_receives_matching_result() {
    let url = spawn_server(|mut ws| async move {
        let cmd = next_json(&mut ws).await.expect("command");
        assert_eq!(cmd["method"], "echo.test");
        send_json(&mut ws, json!({ "id": cmd["id"], "result": { "ok": true } })).await;
    })
    .await;

    let client = Client::connect(&url).await.expect("connect");
    let result = client.send("echo.test", json!({})).await.expect("send");
    assert_eq!(result, json!({ "ok": true }));
}

// ============================================================================
// Correlation is id-keyed, not order-keyed
// ============================================================================

#[tokio::test]
async fn out_of_order_responses_resolve_by_id() {
    let url = spawn_server(|mut ws| async move {
        let first = next_json(&mut ws).await.expect("first command");
        let second = next_json(&mut ws).await.expect("second command");

        // Answer in reverse arrival order.
        send_json(&mut ws, json!({ "id": second["id"], "result": { "tag": "second" } })).await;
        send_json(&mut ws, json!({ "id": first["id"], "result": { "tag": "first" } })).await;
    })
    .await;

    let client = Client::connect(&url).await.expect("connect");

    let (a, b) = tokio::join!(
        client.send("op.first", json!({})),
        client.send("op.second", json!({})),
    );

    assert_eq!(a.expect("first")["tag"], "first");
    assert_eq!(b.expect("second")["tag"], "second");
}

// ============================================================================
// Scenario B: timeout, late response discarded
// ============================================================================

#[tokio::test]
async fn timeout_fails_locally_and_late_response_is_discarded() {
    let url = spawn_server(|mut ws| async move {
        let slow = next_json(&mut ws).await.expect("slow command");

        // Reply long after the caller gave up.
        sleep(Duration::from_millis(500)).await;
        send_json(&mut ws, json!({ "id": slow["id"], "result": { "late": true } })).await;

        // The connection must still be usable afterwards.
        let follow_up = next_json(&mut ws).await.expect("follow-up command");
        send_json(&mut ws, json!({ "id": follow_up["id"], "result": { "ok": true } })).await;
    })
    .await;

    let client = Client::connect(&url).await.expect("connect");

    let err = client
        .send_with_timeout("slow.op", json!({}), Duration::from_millis(100))
        .await
        .expect_err("timeout");
    assert!(matches!(err, Error::RequestTimeout { .. }));

    // Give the late response time to arrive and be dropped.
    sleep(Duration::from_millis(600)).await;
    assert_eq!(client.pending_count(), 0);

    let result = client.send("echo.test", json!({})).await.expect("send");
    assert_eq!(result["ok"], true);
}

// ============================================================================
// Remote error envelopes
// ============================================================================

#[tokio::test]
async fn error_envelope_surfaces_as_remote_error() {
    let url = spawn_server(|mut ws| async move {
        let cmd = next_json(&mut ws).await.expect("command");
        send_json(
            &mut ws,
            json!({
                "id": cmd["id"],
                "error": { "code": "no such frame", "message": "frame gone" }
            }),
        )
        .await;
    })
    .await;

    let client = Client::connect(&url).await.expect("connect");
    let err = client
        .send("browsingContext.navigate", json!({ "url": "https://x" }))
        .await
        .expect_err("remote error");

    assert!(matches!(err, Error::Remote { .. }));
    assert_eq!(err.remote_message(), Some("frame gone"));
}

// ============================================================================
// Scenario C: context-filtered event subscription
// ============================================================================

#[tokio::test]
async fn events_are_filtered_by_method_and_context() {
    let url = spawn_server(|mut ws| async move {
        // Unsolicited events: wrong context, wrong method, then a match.
        send_json(
            &mut ws,
            json!({ "method": "dialog.opened", "params": { "context": "ctx2", "message": "no" } }),
        )
        .await;
        send_json(
            &mut ws,
            json!({ "method": "download.started", "params": { "context": "ctx1" } }),
        )
        .await;
        send_json(
            &mut ws,
            json!({ "method": "dialog.opened", "params": { "context": "ctx1", "message": "yes" } }),
        )
        .await;

        // Hold the connection open until the client is done.
        let _ = next_json(&mut ws).await;
    })
    .await;

    let client = Client::connect(&url).await.expect("connect");

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        client.subscribe(
            "dialog.opened",
            Some("ctx1".to_string()),
            Arc::new(move |params| {
                seen.lock().push(params.clone());
            }),
        );
    }

    sleep(Duration::from_millis(200)).await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 1, "exactly one matching event delivered");
    assert_eq!(seen[0]["message"], "yes");
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let url = spawn_server(|mut ws| async move {
        send_json(
            &mut ws,
            json!({ "method": "tick.event", "params": { "n": 1 } }),
        )
        .await;
        sleep(Duration::from_millis(150)).await;
        send_json(
            &mut ws,
            json!({ "method": "tick.event", "params": { "n": 2 } }),
        )
        .await;
        let _ = next_json(&mut ws).await;
    })
    .await;

    let client = Client::connect(&url).await.expect("connect");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let id = {
        let seen = Arc::clone(&seen);
        client.subscribe(
            "tick.event",
            None,
            Arc::new(move |params| seen.lock().push(params["n"].clone())),
        )
    };

    sleep(Duration::from_millis(100)).await;
    assert!(client.unsubscribe(id));
    sleep(Duration::from_millis(150)).await;

    assert_eq!(*seen.lock(), vec![json!(1)]);
}

// ============================================================================
// Scenario F: connection loss fails all pending commands
// ============================================================================

#[tokio::test]
async fn connection_loss_fails_every_pending_command() {
    let url = spawn_server(|mut ws| async move {
        // Swallow three commands, then drop the connection.
        for _ in 0..3 {
            next_json(&mut ws).await.expect("command");
        }
        let _ = ws.close(None).await;
    })
    .await;

    let client = Client::connect(&url).await.expect("connect");

    let (a, b, c) = tokio::join!(
        client.send("pending.one", json!({})),
        client.send("pending.two", json!({})),
        client.send("pending.three", json!({})),
    );

    for result in [a, b, c] {
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }
    assert_eq!(client.pending_count(), 0);
}

// ============================================================================
// close() idempotence
// ============================================================================

#[tokio::test]
async fn close_is_idempotent() {
    let url = spawn_server(|mut ws| async move {
        while next_json(&mut ws).await.is_some() {}
    })
    .await;

    let client = Client::connect(&url).await.expect("connect");

    client.close();
    client.close();

    sleep(Duration::from_millis(100)).await;
    assert!(client.is_closed());

    let err = client.send("after.close", json!({})).await.expect_err("closed");
    assert!(matches!(err, Error::ConnectionClosed));
}

// ============================================================================
// Protocol anomalies are non-fatal
// ============================================================================

#[tokio::test]
async fn unknown_id_and_garbage_frames_are_ignored() {
    let url = spawn_server(|mut ws| async move {
        // Response for an id this client never issued.
        send_json(&mut ws, json!({ "id": 999_999, "result": {} })).await;
        // Not JSON at all.
        ws.send(Message::Text("garbage".into())).await.expect("send");

        // Normal traffic continues.
        let cmd = next_json(&mut ws).await.expect("command");
        send_json(&mut ws, json!({ "id": cmd["id"], "result": { "alive": true } })).await;
    })
    .await;

    let client = Client::connect(&url).await.expect("connect");
    sleep(Duration::from_millis(100)).await;

    let result = client.send("still.works", json!({})).await.expect("send");
    assert_eq!(result["alive"], true);
}
