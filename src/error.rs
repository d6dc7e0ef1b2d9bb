//! Error types for the streamable HTTP transport.

use thiserror::Error;

use crate::state::TransportState;

/// Errors that can occur when using the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// `connect` was called while another connect was in flight, or the
    /// transport was already connected or closed.
    #[error("already connected or connecting (state: {state})")]
    AlreadyConnected {
        /// State observed when the compare-and-set failed.
        state: TransportState,
    },

    /// The server does not expose the unified endpoint (404 / 405).
    #[error("endpoint not supported by server (status {status})")]
    CapabilityNegative {
        /// HTTP status returned by the server.
        status: u16,
    },

    /// The server rejected the request with a 4xx status.
    #[error("client error: status {status}")]
    ClientError {
        /// HTTP status returned by the server.
        status: u16,
    },

    /// The server failed with a 5xx status.
    #[error("server error: status {status}")]
    ServerError {
        /// HTTP status returned by the server.
        status: u16,
    },

    /// Any other status outside `200..=299`.
    #[error("unexpected status code: {status}")]
    UnexpectedStatus {
        /// HTTP status returned by the server.
        status: u16,
    },

    /// The response carried a content type none of the decoders understand.
    #[error("unsupported content type: {0:?}")]
    UnsupportedContentType(String),

    /// A message could not be decoded from the response body.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP engine failed to deliver the request or response.
    #[error("http error: {0}")]
    Http(String),

    /// The response body ended with a read error.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The caller-supplied message handler failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// The legacy fallback transport failed.
    #[error("legacy transport error: {0}")]
    Legacy(String),

    /// Fallback was required but no legacy transport is configured.
    #[error("fallback required but no legacy transport is configured")]
    FallbackUnavailable,

    /// The transport was closed while the operation was running.
    #[error("transport closed")]
    Closed,

    /// The transport configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server lacks the unified endpoint; triggers fallback.
    CapabilityNegative,
    /// Network or server hiccup that may succeed on retry.
    Transient,
    /// A record failed to decode.
    MalformedData,
    /// Unexpected status or unsupported content type.
    ProtocolViolation,
    /// Concurrent connect attempt.
    StateViolation,
    /// Handler, legacy transport or configuration failure.
    Other,
}

impl TransportError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapabilityNegative { .. } => ErrorKind::CapabilityNegative,
            Self::Http(_) | Self::StreamInterrupted(_) => ErrorKind::Transient,
            Self::ServerError { status } if matches!(*status, 502..=504) => ErrorKind::Transient,
            Self::MalformedMessage(_) | Self::Serialization(_) => ErrorKind::MalformedData,
            Self::ClientError { .. }
            | Self::ServerError { .. }
            | Self::UnexpectedStatus { .. }
            | Self::UnsupportedContentType(_) => ErrorKind::ProtocolViolation,
            Self::AlreadyConnected { .. } => ErrorKind::StateViolation,
            Self::Handler(_)
            | Self::Legacy(_)
            | Self::FallbackUnavailable
            | Self::Closed
            | Self::InvalidConfig(_) => ErrorKind::Other,
        }
    }

    /// Returns `true` if the default retry classifier would retry this error.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Returns `true` if this error should redirect traffic to the legacy transport.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            Self::CapabilityNegative { .. } | Self::UnsupportedContentType(_)
        )
    }

    /// Map a non-success HTTP status to the matching error.
    ///
    /// Callers handle `2xx` themselves; this is only for the failure path.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 405 => Self::CapabilityNegative { status },
            400..=499 => Self::ClientError { status },
            500..=599 => Self::ServerError { status },
            _ => Self::UnexpectedStatus { status },
        }
    }
}

/// A specialized [`Result`] type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
