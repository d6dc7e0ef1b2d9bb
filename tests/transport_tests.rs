#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for `StreamableHttpTransport`.
//!
//! Uses the scripted `MockEngine` from `tests/common` to play the server and
//! `MockLegacy` to observe fallback traffic.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use streamable_http_transport::engine::Method;
use streamable_http_transport::{
    JsonRpcMessage, JsonValueCodec, RetryPolicy, StreamableHttpTransport, TransportBuilder,
    TransportConfig, TransportError, TransportState,
};
use tokio_test::{assert_err, assert_ok};

use common::{
    event_stream, eventually, fed_event_stream, init_tracing, json, open_event_stream, status,
    typed, Collector, MockEngine, MockLegacy,
};

const BASE: &str = "http://localhost:8080";

fn transport(engine: MockEngine) -> StreamableHttpTransport {
    StreamableHttpTransport::builder(TransportConfig::new(BASE))
        .with_engine(engine)
        .build()
        .unwrap()
}

fn transport_with_legacy(engine: MockEngine, legacy: &MockLegacy) -> StreamableHttpTransport {
    StreamableHttpTransport::builder(TransportConfig::new(BASE))
        .with_engine(engine)
        .with_legacy(legacy.clone())
        .build()
        .unwrap()
}

fn ping(id: i64) -> JsonRpcMessage {
    JsonRpcMessage::request(id, "ping", None)
}

// ════════════════════════════════════════════════════════════════════
// Connect
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_opens_get_stream_with_accept_header() {
    let (engine, requests) = MockEngine::new(vec![open_event_stream()]);
    let transport = StreamableHttpTransport::builder(
        TransportConfig::new(BASE).with_header("Authorization", "Bearer t"),
    )
    .with_engine(engine)
    .build()
    .unwrap();

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();

    assert_eq!(transport.state(), TransportState::Connected);
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(requests[0].url, "http://localhost:8080/mcp");
    assert_eq!(
        requests[0].header("Accept"),
        Some("application/json, text/event-stream")
    );
    assert_eq!(requests[0].header("Authorization"), Some("Bearer t"));
    assert_eq!(requests[0].header("Last-Event-ID"), None);
}

#[tokio::test]
async fn concurrent_connects_reject_exactly_one() {
    let (engine, requests) = MockEngine::new(vec![open_event_stream(), open_event_stream()]);
    let transport = transport(engine);

    let (a, b) = tokio::join!(
        transport.connect(Collector::<JsonRpcMessage>::new()),
        transport.connect(Collector::<JsonRpcMessage>::new()),
    );

    let rejected = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(TransportError::AlreadyConnected { .. })))
        .count();
    assert_eq!(rejected, 1, "results: {a:?} / {b:?}");
    assert!(a.is_ok() || b.is_ok());
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert_eq!(transport.state(), TransportState::Connected);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_exhaust_four_attempts() {
    let (engine, requests) = MockEngine::new(vec![
        Err(TransportError::Http("connection refused".into())),
        Err(TransportError::Http("connection refused".into())),
        Err(TransportError::Http("connection refused".into())),
        Err(TransportError::Http("connection refused".into())),
    ]);
    let transport = transport(engine);

    let started = tokio::time::Instant::now();
    let err = transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Http(_)));
    assert_eq!(requests.lock().unwrap().len(), 4);
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert!(started.elapsed() >= Duration::from_secs(3 + 6 + 12));
}

#[tokio::test(start_paused = true)]
async fn three_failures_then_success_connects() {
    let (engine, requests) = MockEngine::new(vec![
        status(503),
        Err(TransportError::Http("reset".into())),
        status(502),
        open_event_stream(),
    ]);
    let transport = transport(engine);

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();

    assert_eq!(requests.lock().unwrap().len(), 4);
    assert_eq!(transport.state(), TransportState::Connected);
}

#[tokio::test]
async fn non_transient_failure_is_not_retried() {
    let (engine, requests) = MockEngine::new(vec![status(401)]);
    let transport = transport(engine);

    let err = transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::ClientError { status: 401 }));
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert_eq!(transport.state(), TransportState::Disconnected);
}

#[tokio::test]
async fn failed_connect_can_be_retried_by_caller() {
    let (engine, _requests) = MockEngine::new(vec![status(400), open_event_stream()]);
    let transport = transport(engine);

    assert_err!(transport.connect(Collector::<JsonRpcMessage>::new()).await);
    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();
    assert_eq!(transport.state(), TransportState::Connected);
}

#[tokio::test]
async fn custom_retry_policy_overrides_config() {
    let (engine, requests) = MockEngine::new(vec![status(503), status(503)]);
    let transport = StreamableHttpTransport::builder(TransportConfig::new(BASE))
        .with_engine(engine)
        .with_retry_policy(
            RetryPolicy::new()
                .with_max_retries(1)
                .with_base_delay(Duration::from_millis(1)),
        )
        .build()
        .unwrap();

    let err = transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::ServerError { status: 503 }));
    assert_eq!(requests.lock().unwrap().len(), 2);
}

// ════════════════════════════════════════════════════════════════════
// Server stream
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn stream_messages_reach_connect_handler() {
    let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notify\"}\nid: 1\n\n";
    let (engine, _requests) = MockEngine::new(vec![event_stream(body)]);
    let transport = transport(engine);
    let handler = Collector::<JsonRpcMessage>::new();

    transport.connect(handler.clone()).await.unwrap();

    eventually("stream message", || handler.seen().len() == 1).await;
    assert_eq!(handler.seen()[0].method(), Some("notify"));
    assert_eq!(transport.last_event_id().as_deref(), Some("1"));
}

#[tokio::test]
async fn stream_end_closes_transport_and_silences_sends() {
    let (engine, requests) = MockEngine::new(vec![event_stream("event: message\ndata: {}\n\n")]);
    let transport = TransportBuilder::new(TransportConfig::new(BASE), JsonValueCodec)
        .with_engine(engine)
        .build()
        .unwrap();
    let handler = Collector::new();

    transport.connect(handler.clone()).await.unwrap();
    eventually("closed state", || transport.state() == TransportState::Closed).await;

    transport.send_message(json!({"after": "close"})).await.unwrap();
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert_eq!(handler.seen(), vec![json!({})]);
}

#[tokio::test]
async fn interrupted_stream_resumes_with_last_event_id() {
    init_tracing();
    let (tx, first) = fed_event_stream();
    let (engine, requests) = MockEngine::new(vec![first, open_event_stream()]);
    let transport = transport(engine);
    let handler = Collector::<JsonRpcMessage>::new();

    transport.connect(handler.clone()).await.unwrap();
    for line in [
        "event: message",
        "data: {\"jsonrpc\":\"2.0\",\"method\":\"tick\"}",
        "id: 42",
        "",
    ] {
        tx.send(Ok(line.to_string())).unwrap();
    }
    eventually("first message", || handler.seen().len() == 1).await;
    tx.send(Err(TransportError::StreamInterrupted("reset".into())))
        .unwrap();

    eventually("resume request", || requests.lock().unwrap().len() == 2).await;
    let requests = requests.lock().unwrap();
    assert_eq!(requests[1].method, Method::Get);
    assert_eq!(requests[1].header("Last-Event-ID"), Some("42"));
    assert_eq!(transport.state(), TransportState::Connected);
}

#[tokio::test]
async fn close_stops_stream_task() {
    let (tx, first) = fed_event_stream();
    let (engine, requests) = MockEngine::new(vec![first]);
    let transport = transport(engine);
    let handler = Collector::<JsonRpcMessage>::new();

    transport.connect(handler.clone()).await.unwrap();
    transport.close_gracefully().await.unwrap();
    assert_eq!(transport.state(), TransportState::Closed);

    // Lines arriving after close are not delivered and nothing is reopened.
    let _ = tx.send(Ok("event: message".to_string()));
    let _ = tx.send(Ok("data: {\"jsonrpc\":\"2.0\",\"method\":\"late\"}".to_string()));
    let _ = tx.send(Ok(String::new()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handler.seen().is_empty());
    assert_eq!(requests.lock().unwrap().len(), 1);
}

// ════════════════════════════════════════════════════════════════════
// Send
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn send_202_calls_no_handler() {
    let (engine, requests) = MockEngine::new(vec![status(202)]);
    let transport = StreamableHttpTransport::builder(
        TransportConfig::new(BASE).with_connect_on_send(false),
    )
    .with_engine(engine)
    .build()
    .unwrap();
    let handler = Collector::<JsonRpcMessage>::new();

    assert_ok!(transport.send_message_with(ping(1), handler.clone()).await);

    assert!(handler.seen().is_empty());
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].header("Content-Type"), Some("application/json"));
    let sent: serde_json::Value =
        serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(sent, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
}

#[tokio::test]
async fn send_decodes_json_reply() {
    let (engine, _requests) =
        MockEngine::new(vec![json(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#)]);
    let transport = StreamableHttpTransport::builder(
        TransportConfig::new(BASE).with_connect_on_send(false),
    )
    .with_engine(engine)
    .build()
    .unwrap();
    let handler = Collector::<JsonRpcMessage>::new();

    transport
        .send_message_with(ping(1), handler.clone())
        .await
        .unwrap();

    let seen = handler.seen();
    assert_eq!(seen, vec![JsonRpcMessage::response(1, json!({"ok": true}))]);
}

#[tokio::test]
async fn send_decodes_json_sequence_reply() {
    let (engine, _requests) = MockEngine::new(vec![typed(
        "application/json-seq",
        "{\"a\":1}\nnot json\n{\"b\":2}\n",
    )]);
    let transport = StreamableHttpTransport::builder(
        TransportConfig::new(BASE).with_connect_on_send(false),
    )
    .with_codec(JsonValueCodec)
    .with_engine(engine)
    .build()
    .unwrap();
    let handler = Collector::new();

    transport
        .send_message_with(json!({"q": 1}), handler.clone())
        .await
        .unwrap();

    assert_eq!(handler.seen(), vec![json!({"a": 1}), json!({"b": 2})]);
}

#[tokio::test]
async fn first_send_connects_implicitly() {
    let (engine, requests) = MockEngine::new(vec![open_event_stream(), status(202)]);
    let transport = transport(engine);

    transport.send_message(ping(1)).await.unwrap();

    assert_eq!(transport.state(), TransportState::Connected);
    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(requests[1].method, Method::Post);
}

#[tokio::test]
async fn concurrent_first_sends_share_one_implicit_connect() {
    let (engine, requests) = MockEngine::new(vec![status(202), status(202), status(202)]);
    let transport = transport(engine);

    let (a, b) = tokio::join!(transport.send_message(ping(1)), transport.send_message(ping(2)));
    assert_ok!(a);
    assert_ok!(b);

    let requests = requests.lock().unwrap();
    let gets = requests.iter().filter(|r| r.method == Method::Get).count();
    let posts = requests.iter().filter(|r| r.method == Method::Post).count();
    assert_eq!(gets, 1);
    assert_eq!(posts, 2);
    assert_eq!(transport.state(), TransportState::Connected);
}

#[tokio::test]
async fn server_error_on_send_is_reported() {
    let (engine, _requests) = MockEngine::new(vec![status(500)]);
    let legacy = MockLegacy::new();
    let transport = StreamableHttpTransport::builder(
        TransportConfig::new(BASE).with_connect_on_send(false),
    )
    .with_engine(engine)
    .with_legacy(legacy.clone())
    .build()
    .unwrap();

    let err = transport.send_message(ping(1)).await.unwrap_err();

    assert!(matches!(err, TransportError::ServerError { status: 500 }));
    assert!(!transport.is_fallback_active());
    assert!(legacy.sent().is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Fallback
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_405_falls_back_to_legacy() {
    init_tracing();
    let (engine, requests) = MockEngine::new(vec![status(405)]);
    let legacy = MockLegacy::new();
    let transport = transport_with_legacy(engine, &legacy);

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();

    assert!(transport.is_fallback_active());
    assert_eq!(legacy.connects(), 1);
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert_eq!(transport.state(), TransportState::Connected);
}

#[tokio::test]
async fn fallback_is_permanent_and_splits_batches() {
    let (engine, requests) = MockEngine::new(vec![status(404)]);
    let legacy = MockLegacy::new();
    let transport = transport_with_legacy(engine, &legacy);

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();
    transport
        .send_message(JsonRpcMessage::Batch(vec![
            ping(1),
            JsonRpcMessage::notification("progress", None),
        ]))
        .await
        .unwrap();
    transport.send_message(ping(2)).await.unwrap();

    assert_eq!(requests.lock().unwrap().len(), 1, "no primary requests after fallback");
    let sent = legacy.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0]["id"], json!(1));
    assert_eq!(sent[1]["method"], json!("progress"));
    assert_eq!(sent[2]["id"], json!(2));
}

#[tokio::test]
async fn unsupported_reply_content_type_falls_back() {
    let (engine, requests) = MockEngine::new(vec![typed("text/html", "<html></html>")]);
    let legacy = MockLegacy::new();
    let transport = StreamableHttpTransport::builder(
        TransportConfig::new(BASE).with_connect_on_send(false),
    )
    .with_engine(engine)
    .with_legacy(legacy.clone())
    .build()
    .unwrap();

    transport.send_message(ping(7)).await.unwrap();

    assert!(transport.is_fallback_active());
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert_eq!(legacy.sent(), vec![json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})]);
}

#[tokio::test]
async fn send_404_falls_back_and_forwards() {
    let (engine, requests) = MockEngine::new(vec![status(404)]);
    let legacy = MockLegacy::new();
    let transport = StreamableHttpTransport::builder(
        TransportConfig::new(BASE).with_connect_on_send(false),
    )
    .with_engine(engine)
    .with_legacy(legacy.clone())
    .build()
    .unwrap();

    assert_ok!(transport.send_message(ping(1)).await);

    assert!(transport.is_fallback_active());
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert_eq!(legacy.sent(), vec![json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})]);
}

#[tokio::test]
async fn unsupported_stream_content_type_falls_back_on_connect() {
    let (engine, requests) = MockEngine::new(vec![typed("text/plain", "hello")]);
    let legacy = MockLegacy::new();
    let transport = transport_with_legacy(engine, &legacy);

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();

    assert!(transport.is_fallback_active());
    assert_eq!(legacy.connects(), 1);
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn connect_after_fallback_goes_straight_to_legacy() {
    let (engine, requests) = MockEngine::new(vec![status(405)]);
    let legacy = MockLegacy::new();
    let transport = transport_with_legacy(engine, &legacy);

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();
    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();

    assert_eq!(legacy.connects(), 2);
    assert_eq!(requests.lock().unwrap().len(), 1, "no primary requests after fallback");
}

#[tokio::test]
async fn fallback_status_while_resuming_trips_latch() {
    let (tx, first) = fed_event_stream();
    let (engine, requests) = MockEngine::new(vec![first, status(405)]);
    let legacy = MockLegacy::new();
    let transport = transport_with_legacy(engine, &legacy);

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();
    tx.send(Err(TransportError::StreamInterrupted("reset".into())))
        .unwrap();

    eventually("disconnect after failed resume", || {
        transport.state() == TransportState::Disconnected
    })
    .await;
    assert!(transport.is_fallback_active());
    assert_eq!(requests.lock().unwrap().len(), 2);

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();
    assert_eq!(legacy.connects(), 1);
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn fallback_without_legacy_fails_connect() {
    let (engine, _requests) = MockEngine::new(vec![status(405)]);
    let transport = transport(engine);

    let err = transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::FallbackUnavailable));
    assert!(transport.is_fallback_active());
    assert_eq!(transport.state(), TransportState::Disconnected);
}

#[tokio::test]
async fn close_with_active_fallback_closes_legacy() {
    let (engine, _requests) = MockEngine::new(vec![status(405)]);
    let legacy = MockLegacy::new();
    let transport = transport_with_legacy(engine, &legacy);

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();
    transport.close_gracefully().await.unwrap();

    assert_eq!(legacy.closes(), 1);
    assert_eq!(transport.state(), TransportState::Closed);
}

#[tokio::test]
async fn close_without_fallback_leaves_legacy_alone() {
    let (engine, _requests) = MockEngine::new(vec![open_event_stream()]);
    let legacy = MockLegacy::new();
    let transport = transport_with_legacy(engine, &legacy);

    transport
        .connect(Collector::<JsonRpcMessage>::new())
        .await
        .unwrap();
    transport.close_gracefully().await.unwrap();

    assert_eq!(legacy.closes(), 0);
}

#[tokio::test]
async fn transport_is_shareable_across_tasks() {
    let (engine, requests) = MockEngine::new(vec![status(202), status(202), status(202)]);
    let transport = Arc::new(
        StreamableHttpTransport::builder(TransportConfig::new(BASE).with_connect_on_send(false))
            .with_engine(engine)
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.send_message(ping(i)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(requests.lock().unwrap().len(), 3);
}
