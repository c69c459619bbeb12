//! Cross-process command and response shapes.
//!
//! `correlationId` is the only join key between a command and its reply.
//! Everything else is flattened next to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RelayError, Result};

pub const DEFAULT_COMMAND_CHANNEL: &str = "relaywire:ipc:commands";
pub const DEFAULT_RESPONSE_CHANNEL: &str = "relaywire:ipc:responses";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpcCommand {
    #[serde(rename = "type")]
    pub kind: String,
    /// Filled in by the bus when the initiator left it empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IpcCommand {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            correlation_id: None,
            fields: Map::new(),
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpcResponse {
    pub correlation_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IpcResponse {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Reply reporting that the remote handler failed.
    pub fn failure(correlation_id: impl Into<String>, err: &RelayError) -> Self {
        Self::new(correlation_id).with_field(
            "error",
            serde_json::json!({ "code": err.wire_code(), "message": err.client_message() }),
        )
    }
}

/// Turn an `error` field written by [`IpcResponse::failure`] back into a handler error.
pub fn remote_result(body: Map<String, Value>) -> Result<Map<String, Value>> {
    match body.get("error") {
        Some(Value::Object(e)) => {
            let code = e.get("code").and_then(Value::as_str).unwrap_or("REMOTE_ERROR");
            let message = e.get("message").and_then(Value::as_str).unwrap_or_default();
            Err(RelayError::domain(code, message))
        }
        _ => Ok(body),
    }
}
