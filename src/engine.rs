//! HTTP engine abstraction.
//!
//! The transport needs one primitive from the HTTP stack: send a request and
//! get back the status, the headers and the body as a stream of text lines.
//! Connection pooling, TLS and proxying stay inside the [`HttpEngine`]
//! implementation.
//!
//! # Implementing a Custom Engine
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use streamable_http_transport::engine::{HttpEngine, HttpRequest, HttpResponse};
//! use streamable_http_transport::error::TransportError;
//!
//! struct MyEngine { /* ... */ }
//!
//! #[async_trait]
//! impl HttpEngine for MyEngine {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
//!         // Issue the request and wrap the body in a line stream
//!         unimplemented!()
//!     }
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::{Result, TransportError};

/// HTTP method used by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Opens the long-lived server stream.
    Get,
    /// Delivers client messages.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Request body, if any.
    pub body: Option<String>,
}

impl HttpRequest {
    /// Create a request without headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Response body as a stream of lines without their terminators.
pub type LineStream = BoxStream<'static, Result<String>>;

/// A response whose body has not been read yet.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Body lines, yielded as they arrive.
    pub body: LineStream,
}

impl HttpResponse {
    /// Create a response from already-split lines.
    pub fn from_lines<I, S>(status: u16, headers: Vec<(String, String)>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: Send + 'static,
        S: Into<String> + 'static,
    {
        Self {
            status,
            headers,
            body: stream::iter(lines.into_iter().map(|l| Ok(l.into()))).boxed(),
        }
    }

    /// Create a response from a text body, split on line terminators.
    pub fn from_text(status: u16, headers: Vec<(String, String)>, text: &str) -> Self {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        Self::from_lines(status, headers, lines)
    }

    /// Create a response with an empty body.
    pub fn empty(status: u16) -> Self {
        Self::from_lines(status, Vec::new(), Vec::<String>::new())
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// The `Content-Type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns `true` for `200..=299`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Sends HTTP requests on behalf of the transport.
#[async_trait]
pub trait HttpEngine: Send + Sync + 'static {
    /// Send `request` and return the response with an unread body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] when the request could not be
    /// delivered or no response head arrived. Non-2xx statuses are *not*
    /// errors at this level.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Split a stream of byte chunks into text lines.
///
/// Lines may span chunk boundaries. `\n` and `\r\n` both terminate a line.
/// A final line without a terminator is still yielded when the stream ends.
/// Chunk errors are surfaced once and end the stream.
pub fn lines_from_chunks<S, B, E>(chunks: S) -> LineStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    struct State<S> {
        chunks: std::pin::Pin<Box<S>>,
        buffer: Vec<u8>,
        done: bool,
    }

    let state = State {
        chunks: Box::pin(chunks),
        buffer: Vec::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = state.buffer.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Some((decode_line(line), state));
            }
            if state.done {
                if state.buffer.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut state.buffer);
                return Some((decode_line(line), state));
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    state.done = true;
                    state.buffer.clear();
                    return Some((
                        Err(TransportError::StreamInterrupted(e.to_string())),
                        state,
                    ));
                }
                None => state.done = true,
            }
        }
    })
    .boxed()
}

fn decode_line(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| TransportError::MalformedMessage(format!("body is not valid UTF-8: {e}")))
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

    fn chunks(
        parts: Vec<&'static str>,
    ) -> impl Stream<Item = std::result::Result<&'static [u8], String>> {
        stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes())))
    }

    async fn collect(stream: LineStream) -> Vec<String> {
        stream.map(|l| l.unwrap()).collect().await
    }

    #[tokio::test]
    async fn lines_span_chunk_boundaries() {
        let lines =
            collect(lines_from_chunks(chunks(vec!["data: he", "llo\nda", "ta: x\n"]))).await;
        assert_eq!(lines, vec!["data: hello", "data: x"]);
    }

    #[tokio::test]
    async fn crlf_is_stripped_and_blank_lines_kept() {
        let lines = collect(lines_from_chunks(chunks(vec!["a\r\n\r\nb\n"]))).await;
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[tokio::test]
    async fn unterminated_tail_is_yielded() {
        let lines = collect(lines_from_chunks(chunks(vec!["one\ntwo"]))).await;
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn chunk_error_becomes_stream_interrupted() {
        let parts: Vec<std::result::Result<&'static [u8], String>> =
            vec![Ok(b"ok\npart"), Err("reset by peer".into())];
        let results: Vec<_> = lines_from_chunks(stream::iter(parts)).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_deref().unwrap(), "ok");
        assert!(matches!(results[1], Err(TransportError::StreamInterrupted(_))));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = HttpResponse::from_lines(
            200,
            vec![("Content-Type".into(), "text/event-stream".into())],
            Vec::<String>::new(),
        );
        assert_eq!(response.content_type(), Some("text/event-stream"));
        assert!(response.is_success());
    }

    #[test]
    fn request_builder_accumulates_headers() {
        let request = HttpRequest::new(Method::Post, "http://localhost/mcp")
            .with_header("Accept", "application/json")
            .with_body("{}");
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.body.as_deref(), Some("{}"));
        assert_eq!(request.method.to_string(), "POST");
    }
}
