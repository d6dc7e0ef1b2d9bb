//! JSON-RPC 2.0 message types.
//!
//! These are the default wire types carried by the transport. The transport
//! itself only sees them through a [`MessageCodec`](crate::codec::MessageCodec),
//! so the envelope is kept deliberately thin: `params`, `result` and `error.data`
//! stay as raw [`serde_json::Value`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier.
    Number(i64),
    /// String identifier.
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

/// A request expecting a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlates the response.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A one-way notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i64,
    /// Short description.
    pub message: String,
    /// Additional details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Identifier of the request this answers.
    pub id: RequestId,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Any JSON-RPC message, including batches.
///
/// Variant order matters for untagged deserialization: a batch is an array,
/// a request is the only shape with both `id` and `method`, a notification
/// has `method` but no `id`, and anything left with an `id` is a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Several messages sent as one JSON array.
    Batch(Vec<JsonRpcMessage>),
    /// A request.
    Request(JsonRpcRequest),
    /// A notification.
    Notification(JsonRpcNotification),
    /// A response.
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Build a request message.
    pub fn request(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Self {
        Self::Request(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    /// Build a notification message.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        })
    }

    /// Build a successful response message.
    pub fn response(id: impl Into<RequestId>, result: Value) -> Self {
        Self::Response(JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        })
    }

    /// Returns `true` for [`JsonRpcMessage::Batch`].
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Batch(_) | Self::Response(_) => None,
        }
    }

    /// Split a batch into its items; any other message yields itself.
    pub fn into_items(self) -> Vec<JsonRpcMessage> {
        match self {
            Self::Batch(items) => items,
            other => vec![other],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_deserializes_as_request() {
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert_eq!(msg, JsonRpcMessage::request(1, "ping", None));
    }

    #[test]
    fn notification_has_no_id() {
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#)
                .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification(_)));
        assert_eq!(msg.method(), Some("notifications/progress"));
    }

    #[test]
    fn response_with_error() {
        let msg: JsonRpcMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"abc","error":{"code":-32601,"message":"nope"}}"#,
        )
        .unwrap();
        let JsonRpcMessage::Response(resp) = msg else {
            panic!("expected response, got {msg:?}");
        };
        assert_eq!(resp.id, RequestId::from("abc"));
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[test]
    fn batch_serializes_as_array() {
        let batch = JsonRpcMessage::Batch(vec![
            JsonRpcMessage::request(1, "a", None),
            JsonRpcMessage::notification("b", Some(json!({"x": 1}))),
        ]);
        let value = serde_json::to_value(&batch).unwrap();
        assert!(value.is_array());
        assert_eq!(value[1]["params"]["x"], 1);
    }

    #[test]
    fn into_items_flattens_batch_only() {
        let single = JsonRpcMessage::notification("n", None);
        assert_eq!(single.clone().into_items(), vec![single]);
        let batch = JsonRpcMessage::Batch(vec![
            JsonRpcMessage::notification("a", None),
            JsonRpcMessage::notification("b", None),
        ]);
        assert_eq!(batch.into_items().len(), 2);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = serde_json::to_string(&JsonRpcMessage::request(7, "ping", None)).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#);
    }
}
