//! Fallback to the legacy event-stream transport.
//!
//! Servers that predate the unified endpoint answer the probe with 404 or
//! 405. When that happens the [`FallbackLatch`] trips and every later
//! operation is forwarded to a [`LegacyTransport`]. The latch never resets.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::warn;

use crate::codec::MessageCodec;
use crate::error::{Result, TransportError};
use crate::handler::SharedHandler;

/// The legacy transport, treated as a black box.
///
/// Only single messages cross this interface; batches are split by the
/// caller before forwarding.
#[async_trait]
pub trait LegacyTransport<M>: Send + Sync + 'static {
    /// Open the legacy session and start delivering messages to `handler`.
    ///
    /// # Errors
    ///
    /// Returns an error if the legacy session cannot be established.
    async fn connect(&self, handler: SharedHandler<M>) -> Result<()>;

    /// Send one message over the legacy session.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be delivered.
    async fn send_message(&self, message: M) -> Result<()>;

    /// Close the legacy session.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    async fn close_gracefully(&self) -> Result<()>;
}

/// One-way latch redirecting traffic to the legacy transport.
#[derive(Debug, Default)]
pub struct FallbackLatch {
    tripped: AtomicBool,
}

impl FallbackLatch {
    /// Create an untripped latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the latch has tripped.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Trip the latch. Returns `true` only for the call that flipped it.
    pub fn trip(&self) -> bool {
        !self.tripped.swap(true, Ordering::AcqRel)
    }
}

/// Forward `message` to the legacy transport, one item at a time.
///
/// Batches are split through the codec and sent in their original order.
/// Every item is attempted even if an earlier one fails; the first failure
/// is returned once all items have been tried.
pub(crate) async fn forward<C: MessageCodec>(
    codec: &C,
    legacy: Option<&dyn LegacyTransport<C::Message>>,
    message: C::Message,
) -> Result<()> {
    let Some(legacy) = legacy else {
        warn!("fallback active but no legacy transport configured, dropping message");
        return Err(TransportError::FallbackUnavailable);
    };

    let items = codec.split_batch(message);
    let total = items.len();
    let mut first_error = None;
    for (index, item) in items.into_iter().enumerate() {
        if let Err(e) = legacy.send_message(item).await {
            warn!(index, total, error = %e, "legacy transport failed to send item");
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
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
    use crate::codec::JsonRpcCodec;
    use crate::protocol::JsonRpcMessage;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingLegacy {
        sent: StdMutex<Vec<JsonRpcMessage>>,
        fail_method: Option<&'static str>,
    }

    #[async_trait]
    impl LegacyTransport<JsonRpcMessage> for RecordingLegacy {
        async fn connect(&self, _handler: SharedHandler<JsonRpcMessage>) -> Result<()> {
            Ok(())
        }

        async fn send_message(&self, message: JsonRpcMessage) -> Result<()> {
            let fail = message.method() == self.fail_method && self.fail_method.is_some();
            self.sent.lock().unwrap().push(message);
            if fail {
                Err(TransportError::Legacy("boom".into()))
            } else {
                Ok(())
            }
        }

        async fn close_gracefully(&self) -> Result<()> {
            Ok(())
        }
    }

    fn batch(methods: &[&str]) -> JsonRpcMessage {
        JsonRpcMessage::Batch(
            methods
                .iter()
                .map(|m| JsonRpcMessage::notification(*m, None))
                .collect(),
        )
    }

    #[test]
    fn trip_is_idempotent() {
        let latch = FallbackLatch::new();
        assert!(!latch.is_tripped());
        assert!(latch.trip());
        assert!(!latch.trip());
        assert!(latch.is_tripped());
    }

    #[tokio::test]
    async fn batch_is_forwarded_item_by_item_in_order() {
        let legacy = RecordingLegacy::default();
        forward(&JsonRpcCodec, Some(&legacy), batch(&["a", "b", "c"]))
            .await
            .unwrap();
        let sent = legacy.sent.lock().unwrap();
        let methods: Vec<_> = sent.iter().filter_map(JsonRpcMessage::method).collect();
        assert_eq!(methods, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failed_item_does_not_stop_the_rest() {
        let legacy = RecordingLegacy {
            fail_method: Some("b"),
            ..Default::default()
        };
        let err = forward(&JsonRpcCodec, Some(&legacy), batch(&["a", "b", "c"]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Legacy(_)));
        assert_eq!(legacy.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_legacy_transport_is_an_error() {
        let err = forward(&JsonRpcCodec, None, JsonRpcMessage::notification("a", None))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::FallbackUnavailable));
    }
}
