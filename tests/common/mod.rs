#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for transport integration tests.
//!
//! Provides a scripted [`MockEngine`], a recording [`MockLegacy`] and a
//! [`Collector`] handler, plus helpers for building canned responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use streamable_http_transport::engine::{HttpEngine, HttpRequest, HttpResponse};
use streamable_http_transport::{
    LegacyTransport, MessageHandler, Result, SharedHandler, TransportError,
};

// ── MockEngine ──────────────────────────────────────────────────────

/// Scripted HTTP engine.
///
/// Responses are handed out in order, one per request. Every request is
/// recorded. Once the script runs dry each request fails with a transient
/// HTTP error.
pub struct MockEngine {
    responses: StdMutex<VecDeque<Result<HttpResponse>>>,
    /// Recorded requests, in the order they were issued.
    pub requests: Arc<StdMutex<Vec<HttpRequest>>>,
}

impl MockEngine {
    /// Create an engine with the given script. Returns the engine plus a
    /// shared handle to the recorded requests.
    pub fn new(responses: Vec<Result<HttpResponse>>) -> (Self, Arc<StdMutex<Vec<HttpRequest>>>) {
        let requests = Arc::new(StdMutex::new(Vec::new()));
        let engine = Self {
            responses: StdMutex::new(VecDeque::from(responses)),
            requests: Arc::clone(&requests),
        };
        (engine, requests)
    }
}

#[async_trait]
impl HttpEngine for MockEngine {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        // Yield so concurrent callers interleave like they would on a socket.
        tokio::task::yield_now().await;
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Http("no scripted response left".into())))
    }
}

// ── MockLegacy ──────────────────────────────────────────────────────

/// Legacy transport that records what it is asked to do.
#[derive(Clone, Default)]
pub struct MockLegacy {
    /// Number of `connect` calls.
    pub connects: Arc<AtomicUsize>,
    /// Number of `close_gracefully` calls.
    pub closes: Arc<AtomicUsize>,
    /// Messages forwarded through `send_message`.
    pub sent: Arc<StdMutex<Vec<serde_json::Value>>>,
}

impl MockLegacy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl<M: serde::Serialize + Send + Sync + 'static> LegacyTransport<M> for MockLegacy {
    async fn connect(&self, _handler: SharedHandler<M>) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(&self, message: M) -> Result<()> {
        let value = serde_json::to_value(&message)?;
        self.sent.lock().unwrap().push(value);
        Ok(())
    }

    async fn close_gracefully(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Collector ───────────────────────────────────────────────────────

/// Handler that stores every message it receives.
#[derive(Clone)]
pub struct Collector<M> {
    pub seen: Arc<StdMutex<Vec<M>>>,
}

impl<M: Clone> Collector<M> {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    pub fn seen(&self) -> Vec<M> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl<M: Send + 'static> MessageHandler<M> for Collector<M> {
    async fn handle(&self, message: M) -> Result<()> {
        self.seen.lock().unwrap().push(message);
        Ok(())
    }
}

// ── Canned responses ────────────────────────────────────────────────

fn content_type(value: &str) -> Vec<(String, String)> {
    vec![("Content-Type".to_string(), value.to_string())]
}

/// A response with the given status and no body.
pub fn status(code: u16) -> Result<HttpResponse> {
    Ok(HttpResponse::empty(code))
}

/// `200 application/json` with `body`.
pub fn json(body: &str) -> Result<HttpResponse> {
    Ok(HttpResponse::from_text(200, content_type("application/json"), body))
}

/// `200` with an arbitrary content type and body.
pub fn typed(content: &str, body: &str) -> Result<HttpResponse> {
    Ok(HttpResponse::from_text(200, content_type(content), body))
}

/// `200 text/event-stream` whose body ends after `body`.
pub fn event_stream(body: &str) -> Result<HttpResponse> {
    typed("text/event-stream", body)
}

/// `200 text/event-stream` whose body never produces a line.
pub fn open_event_stream() -> Result<HttpResponse> {
    Ok(HttpResponse {
        status: 200,
        headers: content_type("text/event-stream"),
        body: stream::pending::<Result<String>>().boxed(),
    })
}

/// `200 text/event-stream` whose lines are fed through the returned sender.
/// Dropping the sender ends the body.
pub fn fed_event_stream() -> (mpsc::UnboundedSender<Result<String>>, Result<HttpResponse>) {
    let (tx, rx) = mpsc::unbounded_channel::<Result<String>>();
    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (line, rx))
    })
    .boxed();
    let response = HttpResponse {
        status: 200,
        headers: content_type("text/event-stream"),
        body,
    };
    (tx, Ok(response))
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

/// Route transport logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
