//! # Streamable HTTP Transport
//!
//! Client-side transport for JSON-RPC over streamable HTTP.
//!
//! The transport talks to a single endpoint: GET opens a long-lived server
//! stream, POST delivers client messages. Replies and server-initiated
//! messages arrive in one of three encodings, chosen by the server per
//! response:
//!
//! | `Content-Type`         | Decoding                                   |
//! |------------------------|--------------------------------------------|
//! | `application/json`     | one document (object or array of objects)  |
//! | `application/json-seq` | one message per line, bad lines skipped    |
//! | `text/event-stream`    | `event:` / `data:` / `id:` frames          |
//!
//! ## Features
//!
//! - **Resumable**: the last event id is sent as `Last-Event-ID` when the
//!   stream is reopened
//! - **Backward compatible**: servers answering 404 / 405 are served through
//!   a [`LegacyTransport`] for the rest of the transport's lifetime
//! - **Retrying**: transient connect failures are retried with exponential
//!   backoff (3 retries, 3 s base delay by default)
//! - **Engine-agnostic**: implement [`HttpEngine`] for any HTTP stack; the
//!   default `engine-reqwest` feature provides [`ReqwestEngine`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use streamable_http_transport::{JsonRpcMessage, StreamableHttpTransport, TransportConfig};
//!
//! let transport = StreamableHttpTransport::builder(TransportConfig::new("http://localhost:8080"))
//!     .build()?;
//!
//! transport
//!     .connect(|msg: JsonRpcMessage| async move {
//!         tracing::info!(?msg, "received");
//!         Ok(())
//!     })
//!     .await?;
//!
//! transport
//!     .send_message(JsonRpcMessage::request(1, "initialize", None))
//!     .await?;
//! ```

pub mod client;
pub mod codec;
pub mod decoder;
pub mod engine;
pub mod engines;
pub mod error;
pub mod fallback;
pub mod handler;
pub mod protocol;
pub mod resumption;
pub mod retry;
pub mod sse;
pub mod state;

// Re-export primary types for ergonomic imports.
pub use client::{StreamableHttpTransport, TransportBuilder, TransportConfig};
pub use codec::{JsonRpcCodec, JsonValueCodec, MessageCodec};
pub use decoder::StreamDecoder;
pub use engine::{HttpEngine, HttpRequest, HttpResponse};
pub use error::{ErrorKind, Result, TransportError};
pub use fallback::LegacyTransport;
pub use handler::{MessageHandler, SharedHandler};
pub use protocol::JsonRpcMessage;
pub use retry::RetryPolicy;
pub use sse::SseFrame;
pub use state::TransportState;

#[cfg(feature = "engine-reqwest")]
pub use engines::ReqwestEngine;
