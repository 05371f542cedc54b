//! JSON-RPC 2.0 envelope parsing and response building

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Gateway-specific: the session id is unknown or was closed
pub const SESSION_NOT_FOUND: i32 = -32001;

/// JSON-RPC error object, also used as the error type of protocol handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    pub fn session_not_found() -> Self {
        Self::new(SESSION_NOT_FOUND, "Session not found")
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Error response; a missing id is written as `null`
    pub fn error(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(error),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize JSON-RPC response: {}", e);
            format!(
                r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"Internal error"}}}}"#,
                INTERNAL_ERROR
            )
        })
    }
}

/// A parsed inbound message: any JSON object, not yet validated as a request
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Parse a request body. Anything but a JSON object is a parse error.
    pub fn parse(body: &str) -> Result<Self, RpcError> {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(_) => Err(RpcError::parse_error("Body must be a JSON object")),
            Err(e) => Err(RpcError::parse_error(format!("Parse error: {}", e))),
        }
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn is_version2(&self) -> bool {
        self.fields.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
    }

    pub fn has_method(&self) -> bool {
        self.method().is_some()
    }

    pub fn method(&self) -> Option<&str> {
        self.fields.get("method").and_then(Value::as_str)
    }

    /// A reply sent by the client (has `id` plus `result`/`error`, no `method`)
    pub fn is_response_shaped(&self) -> bool {
        self.fields.contains_key("id")
            && (self.fields.contains_key("result") || self.fields.contains_key("error"))
            && !self.fields.contains_key("method")
    }

    /// Request id; absent or `null` means the message is a notification
    pub fn id(&self) -> Option<&Value> {
        match self.fields.get("id") {
            None | Some(Value::Null) => None,
            Some(id) => Some(id),
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id().is_none()
    }

    pub fn params(&self) -> Option<&Map<String, Value>> {
        self.fields.get("params").and_then(Value::as_object)
    }
}
