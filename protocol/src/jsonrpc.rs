//! Minimal JSON-RPC 2.0 envelope used to frame the Codex app-server wire
//! protocol. The app-server crate itself isn't vendored anywhere in this
//! workspace's ancestry, so these types are hand-authored against the shapes
//! the Codex bridge actually puts on the wire (see `codex.rs`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request/response ids are either a number or a string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Integer(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: JsonRpcErrorObject,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// Any line on the Codex app-server wire is one of these four shapes. Which
/// one a given line is can only be told apart by which fields are present —
/// `method` means request/notification, `result` means response, `error`
/// means error — so decoding tries them in order.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.get("method").is_some() {
            if value.get("id").is_some() {
                Ok(JsonRpcMessage::Request(serde_json::from_value(value)?))
            } else {
                Ok(JsonRpcMessage::Notification(serde_json::from_value(value)?))
            }
        } else if value.get("error").is_some() {
            Ok(JsonRpcMessage::Error(serde_json::from_value(value)?))
        } else {
            Ok(JsonRpcMessage::Response(serde_json::from_value(value)?))
        }
    }
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        JsonRpcRequest {
            jsonrpc: jsonrpc_version(),
            id,
            method: method.into(),
            params: Some(params),
        }
    }
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        JsonRpcNotification {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params: Some(params),
        }
    }
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: Value) -> Self {
        JsonRpcResponse {
            jsonrpc: jsonrpc_version(),
            id,
            result,
        }
    }
}
