//! The streamable HTTP transport.
//!
//! [`StreamableHttpTransport`] opens a long-lived GET stream, POSTs client
//! messages, and decodes whatever the server answers with (a JSON document,
//! a JSON sequence or an event stream). If the server does not expose the
//! unified endpoint the transport silently switches to a legacy
//! event-stream transport for the rest of its lifetime.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = TransportConfig::new("http://localhost:8080");
//! let transport = StreamableHttpTransport::builder(config)
//!     .with_legacy(my_legacy_transport)
//!     .build()?;
//!
//! transport
//!     .connect(|msg: JsonRpcMessage| async move {
//!         println!("server said: {msg:?}");
//!         Ok(())
//!     })
//!     .await?;
//!
//! transport
//!     .send_message(JsonRpcMessage::request(1, "tools/list", None))
//!     .await?;
//!
//! transport.close_gracefully().await?;
//! ```

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{JsonRpcCodec, MessageCodec};
use crate::decoder::{ResponseDispatcher, StreamDecoder};
use crate::engine::{HttpEngine, HttpRequest, LineStream, Method};
use crate::error::{Result, TransportError};
use crate::fallback::{self, FallbackLatch, LegacyTransport};
use crate::handler::{DiscardHandler, MessageHandler, SharedHandler};
use crate::resumption::ResumptionTracker;
use crate::retry::{self, RetryPolicy};
use crate::state::{StateCell, TransportState};

/// Default endpoint path appended to the base URI.
pub const DEFAULT_ENDPOINT: &str = "/mcp";

/// `Accept` header value sent with every request.
pub const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// Header carrying the resumption token on (re)connect.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`StreamableHttpTransport`].
///
/// Only `base_uri` is required.
///
/// # Example
///
/// ```
/// use streamable_http_transport::client::TransportConfig;
/// use std::time::Duration;
///
/// let config = TransportConfig::new("http://localhost:8080")
///     .with_endpoint("/rpc")
///     .with_header("Authorization", "Bearer abc")
///     .with_base_delay(Duration::from_millis(500));
/// assert_eq!(config.url(), "http://localhost:8080/rpc");
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Scheme, host and port, e.g. `http://localhost:8080`.
    pub base_uri: String,
    /// Path of the unified endpoint. Defaults to `/mcp`.
    pub endpoint: String,
    /// Extra headers added to every request.
    pub headers: Vec<(String, String)>,
    /// Retries after a failed connect attempt. Defaults to **3**.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time. Defaults to **3 seconds**.
    pub base_delay: Duration,
    /// Upper bound for a single retry delay. Defaults to **60 seconds**.
    pub max_delay: Duration,
    /// Open the server stream on the first send if `connect` was never
    /// called. Defaults to `true`.
    pub connect_on_send: bool,
}

impl TransportConfig {
    /// Create a configuration with default values.
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            headers: Vec::new(),
            max_retries: retry::DEFAULT_MAX_RETRIES,
            base_delay: retry::DEFAULT_BASE_DELAY,
            max_delay: retry::DEFAULT_MAX_DELAY,
            connect_on_send: true,
        }
    }

    /// Set the endpoint path.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the number of connect retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the upper bound for a single retry delay.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Enable or disable the implicit connect on first send.
    #[must_use]
    pub fn with_connect_on_send(mut self, connect_on_send: bool) -> Self {
        self.connect_on_send = connect_on_send;
        self
    }

    /// Full URL of the unified endpoint.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_uri, self.endpoint)
    }

    /// Retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(self.max_retries)
            .with_base_delay(self.base_delay)
            .with_max_delay(self.max_delay)
    }

    fn validate(&self) -> Result<()> {
        if self.base_uri.trim().is_empty() {
            return Err(TransportError::InvalidConfig("base URI must not be empty".into()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(TransportError::InvalidConfig("endpoint must not be empty".into()));
        }
        Ok(())
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Builder for [`StreamableHttpTransport`].
pub struct TransportBuilder<C: MessageCodec = JsonRpcCodec> {
    config: TransportConfig,
    codec: C,
    engine: Option<Arc<dyn HttpEngine>>,
    legacy: Option<Arc<dyn LegacyTransport<C::Message>>>,
    retry: Option<RetryPolicy>,
}

impl<C: MessageCodec> TransportBuilder<C> {
    /// Start a builder with an explicit codec.
    pub fn new(config: TransportConfig, codec: C) -> Self {
        Self {
            config,
            codec,
            engine: None,
            legacy: None,
            retry: None,
        }
    }

    /// Switch to another codec.
    ///
    /// The legacy transport is typed by the message type, so one configured
    /// earlier is dropped; call [`with_legacy`](Self::with_legacy) afterwards.
    pub fn with_codec<D: MessageCodec>(self, codec: D) -> TransportBuilder<D> {
        if self.legacy.is_some() {
            warn!("codec replaced, dropping previously configured legacy transport");
        }
        TransportBuilder {
            config: self.config,
            codec,
            engine: self.engine,
            legacy: None,
            retry: self.retry,
        }
    }

    /// Use `engine` for all HTTP traffic.
    ///
    /// Without this call the reqwest engine is used when the
    /// `engine-reqwest` feature is enabled.
    #[must_use]
    pub fn with_engine(mut self, engine: impl HttpEngine) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    /// Use a shared engine for all HTTP traffic.
    #[must_use]
    pub fn with_shared_engine(mut self, engine: Arc<dyn HttpEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Transport to fall back to when the unified endpoint is unavailable.
    #[must_use]
    pub fn with_legacy(mut self, legacy: impl LegacyTransport<C::Message>) -> Self {
        self.legacy = Some(Arc::new(legacy));
        self
    }

    /// Shared variant of [`with_legacy`](Self::with_legacy).
    #[must_use]
    pub fn with_shared_legacy(mut self, legacy: Arc<dyn LegacyTransport<C::Message>>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    /// Override the retry policy derived from the configuration.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Build the transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] if the base URI or endpoint
    /// is empty, or if no HTTP engine is available.
    pub fn build(self) -> Result<StreamableHttpTransport<C>> {
        self.config.validate()?;
        let engine = match self.engine {
            Some(engine) => engine,
            None => default_engine()?,
        };
        if self.legacy.is_none() {
            debug!("no legacy transport configured, fallback will fail");
        }
        let url = self.config.url();
        let retry = self
            .retry
            .unwrap_or_else(|| self.config.retry_policy());
        Ok(StreamableHttpTransport {
            inner: Arc::new(Inner {
                url,
                config: self.config,
                engine,
                codec: self.codec,
                legacy: self.legacy,
                retry,
                state: StateCell::new(),
                fallback: FallbackLatch::new(),
                resumption: ResumptionTracker::new(),
                handler: StdMutex::new(None),
            }),
            stream_task: StdMutex::new(None),
        })
    }
}

#[cfg(feature = "engine-reqwest")]
fn default_engine() -> Result<Arc<dyn HttpEngine>> {
    Ok(Arc::new(crate::engines::ReqwestEngine::new()?))
}

#[cfg(not(feature = "engine-reqwest"))]
fn default_engine() -> Result<Arc<dyn HttpEngine>> {
    Err(TransportError::InvalidConfig("no HTTP engine configured".into()))
}

// ── Shared state ────────────────────────────────────────────────────

/// Result of one attempt to open the server stream.
enum Opened {
    /// 2xx with a decodable body.
    Stream(StreamDecoder, LineStream),
    /// 202: nothing to stream.
    Accepted,
    /// The primary endpoint is unusable.
    Fallback(TransportError),
}

/// State shared between the transport handle and the stream task.
struct Inner<C: MessageCodec> {
    config: TransportConfig,
    url: String,
    engine: Arc<dyn HttpEngine>,
    codec: C,
    legacy: Option<Arc<dyn LegacyTransport<C::Message>>>,
    retry: RetryPolicy,
    state: StateCell,
    fallback: FallbackLatch,
    resumption: ResumptionTracker,
    handler: StdMutex<Option<SharedHandler<C::Message>>>,
}

impl<C: MessageCodec> Inner<C> {
    fn request(&self, method: Method) -> HttpRequest {
        self.config.headers.iter().fold(
            HttpRequest::new(method, self.url.as_str()).with_header("Accept", ACCEPT_VALUE),
            |request, (name, value)| request.with_header(name.as_str(), value.as_str()),
        )
    }

    fn current_handler(&self) -> SharedHandler<C::Message> {
        let registered = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match registered {
            Some(handler) => handler,
            None => Arc::new(DiscardHandler::new()),
        }
    }

    fn is_closed(&self) -> bool {
        self.state.load() == TransportState::Closed
    }

    fn trip_fallback(&self, reason: &TransportError) {
        if self.fallback.trip() {
            warn!(
                reason = %reason,
                "unified endpoint unavailable, falling back to legacy transport"
            );
        }
    }

    async fn legacy_connect(&self, handler: SharedHandler<C::Message>) -> Result<()> {
        match &self.legacy {
            Some(legacy) => legacy.connect(handler).await,
            None => Err(TransportError::FallbackUnavailable),
        }
    }

    async fn forward(&self, message: C::Message) -> Result<()> {
        fallback::forward(&self.codec, self.legacy.as_deref(), message).await
    }

    /// Issue the GET that opens (or resumes) the server stream.
    async fn open_stream(&self) -> Result<Opened> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.fallback.is_tripped() {
            return Ok(Opened::Fallback(TransportError::FallbackUnavailable));
        }

        let mut request = self.request(Method::Get);
        let last_event_id = self.resumption.get();
        if let Some(id) = &last_event_id {
            request = request.with_header(LAST_EVENT_ID_HEADER, id.as_str());
        }
        debug!(url = %self.url, ?last_event_id, "opening server stream");

        let response = self.engine.execute(request).await?;
        match StreamDecoder::for_response(&response) {
            Ok(Some(decoder)) => Ok(Opened::Stream(decoder, response.body)),
            Ok(None) => Ok(Opened::Accepted),
            Err(e) if e.triggers_fallback() => Ok(Opened::Fallback(e)),
            Err(e) => Err(e),
        }
    }

    /// Consume the server stream until it ends, resuming after transient
    /// interruptions.
    async fn pump_stream(
        self: Arc<Self>,
        mut decoder: StreamDecoder,
        mut body: LineStream,
        handler: SharedHandler<C::Message>,
    ) {
        loop {
            let result = {
                let stop = || self.is_closed();
                ResponseDispatcher::new(&self.codec, handler.as_ref(), &self.resumption)
                    .with_stop_check(&stop)
                    .decode(decoder, body)
                    .await
            };

            if self.is_closed() {
                debug!("transport closed, stream task exiting");
                return;
            }

            let interrupted = match result {
                Ok(count) => {
                    info!(count, "server stream ended");
                    let _ = self
                        .state
                        .transition(TransportState::Connected, TransportState::Closed);
                    return;
                }
                Err(e) if self.retry.should_retry(&e) => e,
                Err(e) => {
                    error!(error = %e, "server stream failed");
                    let _ = self
                        .state
                        .transition(TransportState::Connected, TransportState::Disconnected);
                    return;
                }
            };

            warn!(
                error = %interrupted,
                last_event_id = ?self.resumption.get(),
                "server stream interrupted, resuming"
            );
            let inner = &*self;
            match self.retry.run(move || inner.open_stream()).await {
                Ok(Opened::Stream(next_decoder, next_body)) => {
                    decoder = next_decoder;
                    body = next_body;
                }
                Ok(Opened::Accepted) => {
                    info!("server accepted resume without a stream");
                    let _ = self
                        .state
                        .transition(TransportState::Connected, TransportState::Closed);
                    return;
                }
                Ok(Opened::Fallback(e)) => {
                    self.trip_fallback(&e);
                    let _ = self
                        .state
                        .transition(TransportState::Connected, TransportState::Disconnected);
                    return;
                }
                Err(e) => {
                    error!(error = %e, "could not resume server stream");
                    let _ = self
                        .state
                        .transition(TransportState::Connected, TransportState::Disconnected);
                    return;
                }
            }
        }
    }
}

// ── Transport handle ────────────────────────────────────────────────

/// Client transport for JSON-RPC over streamable HTTP.
///
/// Created with [`StreamableHttpTransport::builder`]. All methods take
/// `&self`; the transport can be shared behind an [`Arc`] and used from
/// several tasks at once.
pub struct StreamableHttpTransport<C: MessageCodec = JsonRpcCodec> {
    inner: Arc<Inner<C>>,
    /// Background task consuming the server stream.
    stream_task: StdMutex<Option<JoinHandle<()>>>,
}

impl StreamableHttpTransport<JsonRpcCodec> {
    /// Start building a transport using the JSON-RPC codec.
    pub fn builder(config: TransportConfig) -> TransportBuilder<JsonRpcCodec> {
        TransportBuilder::new(config, JsonRpcCodec)
    }
}

impl<C: MessageCodec> StreamableHttpTransport<C> {
    /// Open the server stream and deliver its messages to `handler`.
    ///
    /// Returns once the stream is open; the body is consumed by a
    /// background task. When the server answers 404 / 405 (or with an
    /// unsupported content type) the transport switches to the legacy
    /// transport and connects that instead.
    ///
    /// # Errors
    ///
    /// - [`TransportError::AlreadyConnected`] if a connect is already in
    ///   flight or the transport is connected or closed
    /// - the last error of the connect attempts otherwise; the state is
    ///   reset to [`TransportState::Disconnected`] so a later connect can run
    pub async fn connect<H>(&self, handler: H) -> Result<()>
    where
        H: MessageHandler<C::Message>,
    {
        let handler: SharedHandler<C::Message> = Arc::new(handler);
        if self.inner.fallback.is_tripped() {
            return self.inner.legacy_connect(handler).await;
        }

        self.inner
            .state
            .transition(TransportState::Disconnected, TransportState::Connecting)
            .map_err(|state| {
                warn!(%state, "connect rejected");
                TransportError::AlreadyConnected { state }
            })?;

        self.run_connect(handler).await
    }

    /// Send `message`, delivering any reply to the handler registered by
    /// [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// See [`send_message_with`](Self::send_message_with).
    pub async fn send_message(&self, message: C::Message) -> Result<()> {
        let handler = self.inner.current_handler();
        self.send_with_shared(message, handler).await
    }

    /// Send `message` and deliver the reply to `handler`.
    ///
    /// Does nothing once the transport is closed. Batches are split into
    /// single messages when the legacy transport is in use.
    ///
    /// # Errors
    ///
    /// Encoding failures, HTTP failures, error statuses other than 404 / 405,
    /// decoding failures of the reply, and legacy transport failures.
    pub async fn send_message_with<H>(&self, message: C::Message, handler: H) -> Result<()>
    where
        H: MessageHandler<C::Message>,
    {
        self.send_with_shared(message, Arc::new(handler)).await
    }

    /// Close the transport.
    ///
    /// The state becomes [`TransportState::Closed`] immediately; the server
    /// stream task stops at its next line without issuing further requests.
    ///
    /// # Errors
    ///
    /// Errors from the legacy transport's own shutdown.
    pub async fn close_gracefully(&self) -> Result<()> {
        let previous = self.inner.state.close();
        debug!(%previous, "closing transport");
        if self.inner.fallback.is_tripped() {
            if let Some(legacy) = &self.inner.legacy {
                return legacy.close_gracefully().await;
            }
        }
        Ok(())
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection state.
    pub fn state(&self) -> TransportState {
        self.inner.state.load()
    }

    /// Returns `true` once traffic has been redirected to the legacy transport.
    pub fn is_fallback_active(&self) -> bool {
        self.inner.fallback.is_tripped()
    }

    /// The id sent as `Last-Event-ID` on the next (re)connect.
    pub fn last_event_id(&self) -> Option<String> {
        self.inner.resumption.get()
    }

    /// The configuration this transport was built with.
    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Convert an untyped JSON value (e.g. a response `result`) into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] if the value does not match `T`.
    pub fn unmarshal_from<T: DeserializeOwned>(&self, value: serde_json::Value) -> Result<T> {
        Ok(serde_json::from_value(value)?)
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Runs the connect sequence. The caller has already moved the state
    /// into `Connecting`.
    async fn run_connect(&self, handler: SharedHandler<C::Message>) -> Result<()> {
        *self
            .inner
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&handler));

        let inner = &*self.inner;
        let outcome = self.inner.retry.run(move || inner.open_stream()).await;

        match outcome {
            Ok(Opened::Stream(decoder, body)) => {
                if self.finish_connecting(true).is_err() {
                    debug!("transport closed while connecting, dropping stream");
                    return Ok(());
                }
                info!(url = %self.inner.url, ?decoder, "server stream open");
                self.spawn_stream(decoder, body, handler);
                Ok(())
            }
            Ok(Opened::Accepted) => {
                debug!("server accepted GET without a stream");
                let _ = self.finish_connecting(true);
                Ok(())
            }
            Ok(Opened::Fallback(reason)) => {
                self.inner.trip_fallback(&reason);
                let result = self.inner.legacy_connect(handler).await;
                let _ = self.finish_connecting(result.is_ok());
                result
            }
            Err(e) => {
                error!(error = %e, "streamable transport connection error");
                let _ = self.finish_connecting(false);
                Err(e)
            }
        }
    }

    /// Leave `Connecting`. Fails if the transport was closed meanwhile.
    fn finish_connecting(&self, connected: bool) -> std::result::Result<(), TransportState> {
        let next = if connected {
            TransportState::Connected
        } else {
            TransportState::Disconnected
        };
        self.inner
            .state
            .transition(TransportState::Connecting, next)
    }

    fn spawn_stream(
        &self,
        decoder: StreamDecoder,
        body: LineStream,
        handler: SharedHandler<C::Message>,
    ) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(inner.pump_stream(decoder, body, handler));
        let previous = self
            .stream_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn send_with_shared(
        &self,
        message: C::Message,
        handler: SharedHandler<C::Message>,
    ) -> Result<()> {
        if self.inner.fallback.is_tripped() {
            return self.inner.forward(message).await;
        }

        match self.inner.state.load() {
            TransportState::Closed => {
                debug!("transport closed, dropping outgoing message");
                return Ok(());
            }
            TransportState::Disconnected if self.inner.config.connect_on_send => {
                match self
                    .inner
                    .state
                    .transition(TransportState::Disconnected, TransportState::Connecting)
                {
                    Ok(()) => {
                        debug!("implicit connect before first send");
                        self.run_connect(Arc::clone(&handler)).await?;
                    }
                    Err(state) => trace!(%state, "connect already underway, sending directly"),
                }
                if self.inner.fallback.is_tripped() {
                    return self.inner.forward(message).await;
                }
                if self.inner.is_closed() {
                    debug!("transport closed during implicit connect, dropping message");
                    return Ok(());
                }
            }
            _ => {}
        }

        let body = self.inner.codec.encode(&message).inspect_err(|e| {
            error!(error = %e, "failed to encode outgoing message");
        })?;
        let request = self
            .inner
            .request(Method::Post)
            .with_header("Content-Type", "application/json")
            .with_body(body);
        let response = self.inner.engine.execute(request).await.inspect_err(|e| {
            error!(error = %e, "failed to deliver outgoing message");
        })?;

        let dispatched =
            ResponseDispatcher::new(&self.inner.codec, handler.as_ref(), &self.inner.resumption)
                .dispatch(response)
                .await;
        match dispatched {
            Ok(count) => {
                trace!(count, "reply decoded");
                Ok(())
            }
            Err(e) if e.triggers_fallback() => {
                self.inner.trip_fallback(&e);
                self.inner.forward(message).await
            }
            Err(e) => {
                error!(error = %e, "streamable transport send error");
                Err(e)
            }
        }
    }
}

impl<C: MessageCodec> std::fmt::Debug for StreamableHttpTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpTransport")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("fallback", &self.is_fallback_active())
            .field("last_event_id", &self.last_event_id())
            .finish()
    }
}

impl<C: MessageCodec> Drop for StreamableHttpTransport<C> {
    fn drop(&mut self) {
        // The task may be parked on a read that never completes.
        let task = self
            .stream_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::engine::HttpResponse;
    use async_trait::async_trait;

    struct NeverCalled;

    #[async_trait]
    impl HttpEngine for NeverCalled {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            panic!("unexpected request: {request:?}");
        }
    }

    #[test]
    fn config_defaults() {
        let config = TransportConfig::new("http://localhost:3000");
        assert_eq!(config.endpoint, "/mcp");
        assert_eq!(config.url(), "http://localhost:3000/mcp");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_secs(3));
        assert!(config.connect_on_send);
    }

    #[test]
    fn empty_base_uri_is_rejected() {
        let err = StreamableHttpTransport::builder(TransportConfig::new("  "))
            .with_engine(NeverCalled)
            .build()
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let err = StreamableHttpTransport::builder(
            TransportConfig::new("http://localhost").with_endpoint(""),
        )
        .with_engine(NeverCalled)
        .build()
        .unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }

    #[test]
    fn requests_carry_accept_and_custom_headers() {
        let transport = StreamableHttpTransport::builder(
            TransportConfig::new("http://localhost").with_header("X-Api-Key", "k"),
        )
        .with_engine(NeverCalled)
        .build()
        .unwrap();
        let request = transport.inner.request(Method::Get);
        assert_eq!(request.url, "http://localhost/mcp");
        assert_eq!(request.header("accept"), Some(ACCEPT_VALUE));
        assert_eq!(request.header("x-api-key"), Some("k"));
    }

    #[tokio::test]
    async fn send_after_close_is_a_silent_no_op() {
        let transport = StreamableHttpTransport::builder(TransportConfig::new("http://localhost"))
            .with_engine(NeverCalled)
            .build()
            .unwrap();
        transport.close_gracefully().await.unwrap();
        transport
            .send_message(crate::protocol::JsonRpcMessage::notification("n", None))
            .await
            .unwrap();
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn connect_after_close_is_rejected() {
        let transport = StreamableHttpTransport::builder(TransportConfig::new("http://localhost"))
            .with_engine(NeverCalled)
            .build()
            .unwrap();
        transport.close_gracefully().await.unwrap();
        let err = transport
            .connect(|_msg: crate::protocol::JsonRpcMessage| async { Ok::<(), TransportError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::AlreadyConnected {
                state: TransportState::Closed
            }
        ));
    }

    #[test]
    fn unmarshal_from_converts_values() {
        #[derive(serde::Deserialize)]
        struct Tool {
            name: String,
        }
        let transport = StreamableHttpTransport::builder(TransportConfig::new("http://localhost"))
            .with_engine(NeverCalled)
            .build()
            .unwrap();
        let tool: Tool = transport
            .unmarshal_from(serde_json::json!({"name": "search"}))
            .unwrap();
        assert_eq!(tool.name, "search");
        assert!(transport
            .unmarshal_from::<Tool>(serde_json::json!({"nope": 1}))
            .is_err());
    }
}
