//! JSON-RPC 2.0 wire envelopes.
//!
//! The bridge carries these shapes over a one-way "deliver opaque text"
//! primitive in each direction. Outbound envelopes are serialized exactly as
//! shown; inbound text is parsed leniently into [`RawEnvelope`] so the
//! transport can decide whether an `id` matches a pending call before
//! treating the message as a request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// Protocol version literal present on every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound request: `{"jsonrpc":"2.0","id":"<token>","method":"Service.member","params":...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation token. Absent on notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Namespaced method name, `"Service.member"`.
    pub method: String,
    /// Call arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a correlated request.
    #[must_use]
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }
}

/// Outbound success response: `{"jsonrpc":"2.0","id":"<token>","result":...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echo of the request's correlation token.
    pub id: String,
    /// Handler result. Omitted when the handler produced nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl RpcResponse {
    /// Build a success response.
    #[must_use]
    pub fn new(id: impl Into<String>, result: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: id.into(),
            result,
        }
    }
}

/// Outbound error response:
/// `{"jsonrpc":"2.0","id":"<token>","error":{"code":<int>,"message":"..."}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echo of the request's correlation token.
    pub id: String,
    /// The error value.
    pub error: RpcError,
}

impl RpcErrorResponse {
    /// Build an error response.
    #[must_use]
    pub fn new(id: impl Into<String>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id: id.into(),
            error,
        }
    }
}

/// Leniently parsed inbound envelope.
///
/// Classification happens in two steps: the transport first checks whether
/// `id` matches a pending host-initiated call (response), then whether
/// `method` is present (request). An envelope with neither is not an error —
/// it simply is not RPC traffic.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawEnvelope {
    /// Correlation token, if any.
    #[serde(default)]
    pub id: Option<String>,
    /// Method name, if this is a request.
    #[serde(default)]
    pub method: Option<String>,
    /// Call arguments, if this is a request.
    #[serde(default)]
    pub params: Option<Value>,
    /// Result payload, if this is a success response.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error payload, if this is an error response.
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RawEnvelope {
    /// Parse inbound text as a JSON-RPC 2.0 envelope.
    ///
    /// Returns `None` for non-JSON text, non-object JSON, or an object whose
    /// `jsonrpc` member is absent or not `"2.0"` — such messages belong to
    /// generic message subscribers, not the RPC transport.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let object = value.as_object()?;
        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        let req = RpcRequest::new("abc", "js.getX", Some(json!({"n": 1})));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            json!({"jsonrpc":"2.0","id":"abc","method":"js.getX","params":{"n":1}})
        );
    }

    #[test]
    fn request_without_params_omits_field() {
        let req = RpcRequest::new("abc", "js.getX", None);
        let text = serde_json::to_string(&req).unwrap();
        assert!(!text.contains("params"));
    }

    #[test]
    fn error_response_wire_shape() {
        let resp = RpcErrorResponse::new("r1", RpcError::new(-32601, "Method not found: a.b"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], -32601);
        assert_eq!(json["id"], "r1");
    }

    #[test]
    fn parse_rejects_wrong_version() {
        assert!(RawEnvelope::parse(r#"{"jsonrpc":"1.0","id":"x"}"#).is_none());
        assert!(RawEnvelope::parse(r#"{"id":"x","method":"m"}"#).is_none());
    }

    #[test]
    fn parse_rejects_non_object() {
        assert!(RawEnvelope::parse("[1,2,3]").is_none());
        assert!(RawEnvelope::parse("not json").is_none());
        assert!(RawEnvelope::parse("").is_none());
    }

    #[test]
    fn parse_response_with_error() {
        let env =
            RawEnvelope::parse(r#"{"jsonrpc":"2.0","id":"x","error":{"code":-1,"message":"oops"}}"#)
                .unwrap();
        assert_eq!(env.id.as_deref(), Some("x"));
        assert_eq!(env.error.unwrap(), RpcError::new(-1, "oops"));
    }

    #[test]
    fn parse_request_without_id_is_still_rpc() {
        let env = RawEnvelope::parse(r#"{"jsonrpc":"2.0","method":"notify.ping"}"#).unwrap();
        assert!(env.id.is_none());
        assert_eq!(env.method.as_deref(), Some("notify.ping"));
    }
}
