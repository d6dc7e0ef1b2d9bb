//! Message codecs.
//!
//! The transport never looks inside a message. It encodes outgoing messages
//! and decodes incoming text through a [`MessageCodec`], and asks the codec
//! to split batches when traffic has to be fanned out to the legacy transport.

use serde_json::Value;

use crate::error::{Result, TransportError};
use crate::protocol::JsonRpcMessage;

/// Converts protocol messages to and from their wire text.
pub trait MessageCodec: Send + Sync + 'static {
    /// The message type produced and consumed by this codec.
    type Message: Send + Sync + 'static;

    /// Serialize one message (or batch) to text.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] if the message cannot be encoded.
    fn encode(&self, message: &Self::Message) -> Result<String>;

    /// Deserialize one message from text.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] or
    /// [`TransportError::MalformedMessage`] if the text is not a valid message.
    fn decode(&self, text: &str) -> Result<Self::Message>;

    /// Split a batch into its items, in order. Non-batch messages yield themselves.
    fn split_batch(&self, message: Self::Message) -> Vec<Self::Message>;
}

/// serde_json codec for [`JsonRpcMessage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcCodec;

impl MessageCodec for JsonRpcCodec {
    type Message = JsonRpcMessage;

    fn encode(&self, message: &JsonRpcMessage) -> Result<String> {
        Ok(serde_json::to_string(message)?)
    }

    fn decode(&self, text: &str) -> Result<JsonRpcMessage> {
        Ok(serde_json::from_str(text)?)
    }

    fn split_batch(&self, message: JsonRpcMessage) -> Vec<JsonRpcMessage> {
        message.into_items()
    }
}

/// Passthrough codec that hands raw [`serde_json::Value`]s to the handler.
///
/// Useful for servers that speak a JSON dialect the typed envelope rejects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValueCodec;

impl MessageCodec for JsonValueCodec {
    type Message = Value;

    fn encode(&self, message: &Value) -> Result<String> {
        Ok(serde_json::to_string(message)?)
    }

    fn decode(&self, text: &str) -> Result<Value> {
        Ok(serde_json::from_str(text)?)
    }

    fn split_batch(&self, message: Value) -> Vec<Value> {
        match message {
            Value::Array(items) => items,
            other => vec![other],
        }
    }
}

/// Decode a JSON document into one message, or one per element if it is an array.
///
/// Scalars at the top level are rejected: a protocol payload is always an
/// object or an array of objects.
///
/// # Errors
///
/// Fails on invalid JSON, a scalar document, or any element the codec rejects.
pub fn decode_document<C: MessageCodec + ?Sized>(codec: &C, text: &str) -> Result<Vec<C::Message>> {
    let trimmed = text.trim();
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| TransportError::MalformedMessage(format!("invalid JSON document: {e}")))?;
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| codec.decode(&item.to_string()))
            .collect(),
        Value::Object(_) => Ok(vec![codec.decode(trimmed)?]),
        other => Err(TransportError::MalformedMessage(format!(
            "unexpected JSON in payload: {other}"
        ))),
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
    use serde_json::json;

    #[test]
    fn object_document_yields_one_message() {
        let msgs =
            decode_document(&JsonRpcCodec, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert_eq!(msgs.len(), 1);
        assert!(matches!(msgs[0], JsonRpcMessage::Response(_)));
    }

    #[test]
    fn array_document_yields_one_message_per_element_in_order() {
        let msgs = decode_document(
            &JsonRpcCodec,
            r#"[{"jsonrpc":"2.0","method":"a"},{"jsonrpc":"2.0","method":"b"}]"#,
        )
        .unwrap();
        let methods: Vec<_> = msgs.iter().filter_map(JsonRpcMessage::method).collect();
        assert_eq!(methods, vec!["a", "b"]);
    }

    #[test]
    fn scalar_document_is_malformed() {
        let err = decode_document(&JsonValueCodec, "42").unwrap_err();
        assert!(matches!(err, TransportError::MalformedMessage(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = decode_document(&JsonValueCodec, "{not json").unwrap_err();
        assert!(matches!(err, TransportError::MalformedMessage(_)));
    }

    #[test]
    fn one_bad_element_fails_the_document() {
        let err = decode_document(
            &JsonRpcCodec,
            r#"[{"jsonrpc":"2.0","method":"a"},{"unrelated":true}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::Serialization(_)));
    }

    #[test]
    fn value_codec_splits_arrays() {
        let items = JsonValueCodec.split_batch(json!([{"a": 1}, {"b": 2}]));
        assert_eq!(items, vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(JsonValueCodec.split_batch(json!({"a": 1})).len(), 1);
    }

    #[test]
    fn json_rpc_codec_encodes_compactly() {
        let text = JsonRpcCodec
            .encode(&JsonRpcMessage::notification("initialized", None))
            .unwrap();
        assert_eq!(text, r#"{"jsonrpc":"2.0","method":"initialized"}"#);
    }
}
