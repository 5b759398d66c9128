//! The wire protocol spoken between the host and its plugins.
//!
//! Frames are JSON-RPC 2.0 objects, one per line. A request without an `id`
//! is a notification and gets no response. Both sides read with a buffered
//! line reader and write a serialized frame followed by `\n`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method names, grouped by service.
pub mod methods {
    /// Common to every plugin kind.
    pub const PLUGIN_GET_INFO: &str = "plugin/getPluginInfo";
    /// Notification; the plugin should exit after its channel closes.
    pub const PLUGIN_CLOSE: &str = "plugin/close";

    pub const ANALYZER_ANALYZE: &str = "analyzer/analyze";

    pub const LANGUAGE_GET_REQUIRED_PLUGINS: &str = "language/getRequiredPlugins";
    pub const LANGUAGE_RUN: &str = "language/run";

    pub const PROVIDER_CONFIGURE: &str = "provider/configure";
    pub const PROVIDER_CHECK: &str = "provider/check";
    pub const PROVIDER_DIFF: &str = "provider/diff";
    pub const PROVIDER_CREATE: &str = "provider/create";
    pub const PROVIDER_READ: &str = "provider/read";
    pub const PROVIDER_UPDATE: &str = "provider/update";
    pub const PROVIDER_DELETE: &str = "provider/delete";
    pub const PROVIDER_INVOKE: &str = "provider/invoke";

    /// Phone-home logging, plugin to host. Notification.
    pub const ENGINE_LOG: &str = "engine/log";

    pub const MONITOR_INVOKE: &str = "monitor/invoke";
    pub const MONITOR_READ_RESOURCE: &str = "monitor/readResource";
    pub const MONITOR_REGISTER_RESOURCE: &str = "monitor/registerResource";
    pub const MONITOR_REGISTER_RESOURCE_OUTPUTS: &str = "monitor/registerResourceOutputs";
}

/// JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Application codes.
    pub const DUPLICATE_URN: i64 = -32000;
    pub const UNKNOWN_URN: i64 = -32001;
    pub const PROVIDER_FAILURE: i64 = -32002;
    pub const HOST_CLOSED: i64 = -32003;
}

/// An outbound call or notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// The reply to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn result(id: Option<u64>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<u64>, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A structured RPC failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("method '{method}' not found"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }
}

/// Any frame on the wire.
///
/// `Request` must come first: requests carry a required `method` field that
/// responses never have, while every field of `Response` would happily match
/// a request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcMessage {
    Request(RpcRequest),
    Response(RpcResponse),
}
