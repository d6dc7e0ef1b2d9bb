//! HTTP engine backed by `reqwest`.
//!
//! # Feature gate
//!
//! This module is only available when the `engine-reqwest` feature is enabled
//! (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), streamable_http_transport::TransportError> {
//! use streamable_http_transport::engine::{HttpEngine, HttpRequest, Method};
//! use streamable_http_transport::ReqwestEngine;
//!
//! let engine = ReqwestEngine::new()?;
//! let response = engine
//!     .execute(HttpRequest::new(Method::Get, "http://localhost:8080/mcp"))
//!     .await?;
//! println!("status: {}", response.status);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;

use crate::engine::{lines_from_chunks, HttpEngine, HttpRequest, HttpResponse, Method};
use crate::error::{Result, TransportError};

/// Timeout for establishing the TCP (and TLS) connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An [`HttpEngine`] backed by a [`reqwest::Client`].
///
/// The default client speaks HTTP/1.1 only and gives up connecting after
/// [`CONNECT_TIMEOUT`]. Requests themselves have no overall timeout since
/// the server stream is expected to stay open indefinitely.
#[derive(Debug, Clone)]
pub struct ReqwestEngine {
    client: reqwest::Client,
}

impl ReqwestEngine {
    /// Build an engine with the default client settings.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] if the TLS backend cannot be
    /// initialised.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .http1_only()
            .build()
            .map_err(|e| {
                TransportError::InvalidConfig(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    /// Wrap an existing client, e.g. one configured with a proxy or custom
    /// root certificates.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpEngine for ReqwestEngine {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        tracing::trace!(%method, url = %url, "sending HTTP request");
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        tracing::debug!(%method, url = %url, status, "HTTP response received");

        Ok(HttpResponse {
            status,
            headers,
            body: lines_from_chunks(response.bytes_stream()),
        })
    }
}
