//! RPC request and response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;
use crate::protocol::any::AnyEnvelope;

/// Client -> server call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub data: Value,
}

/// Server -> client reply. Exactly one branch is populated, chosen by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RpcPayload {
    Ok {
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<AnyEnvelope>,
    },
    Error {
        method: String,
        #[serde(rename = "errorCode")]
        error_code: String,
        #[serde(rename = "errorMessage")]
        error_message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl RpcPayload {
    pub fn ok(method: impl Into<String>, data: Option<AnyEnvelope>) -> Self {
        RpcPayload::Ok {
            method: method.into(),
            data,
        }
    }

    pub fn error(method: impl Into<String>, err: &RelayError) -> Self {
        let (message, details) = match err {
            RelayError::Validation(issues) => (
                "input validation failed".to_string(),
                serde_json::to_value(issues).ok(),
            ),
            other => (other.client_message(), None),
        };
        RpcPayload::Error {
            method: method.into(),
            error_code: err.wire_code().to_string(),
            error_message: message,
            details,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            RpcPayload::Ok { method, .. } | RpcPayload::Error { method, .. } => method,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RpcPayload::Ok { .. })
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            RpcPayload::Error { error_code, .. } => Some(error_code),
            RpcPayload::Ok { .. } => None,
        }
    }
}
