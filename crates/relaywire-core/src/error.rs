//! Shared error type across relaywire crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Malformed hybrid message or text frame.
    Framing,
    /// Invalid input that is not a schema failure (bad cursor, unknown channel).
    BadRequest,
    /// No type identifier could be resolved while packing.
    UnresolvedType,
    /// No decoder registered for an envelope's type identifier.
    UnknownType,
    /// RPC method is not registered.
    MethodNotFound,
    /// RPC input failed schema validation.
    Validation,
    /// Remote command was not answered in budget.
    Timeout,
    /// Command could not be published on the broker.
    BrokerPublish,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::Framing => "FRAMING_ERROR",
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::UnresolvedType => "UNRESOLVED_TYPE",
            ClientCode::UnknownType => "UNKNOWN_TYPE",
            ClientCode::MethodNotFound => "METHOD_NOT_FOUND",
            ClientCode::Validation => "VALIDATION_ERROR",
            ClientCode::Timeout => "TIMEOUT",
            ClientCode::BrokerPublish => "BROKER_PUBLISH_FAILED",
            ClientCode::Internal => "INTERNAL_SERVER_ERROR",
        }
    }
}

/// One schema violation reported back to an RPC caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Dotted path of the offending field (empty for the whole input).
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("framing error: {0}")]
    Framing(&'static str),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("no type identifier registered for {0}")]
    UnresolvedType(&'static str),
    #[error("unknown type identifier: {0}")]
    UnknownType(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("validation failed ({} issues)", .0.len())]
    Validation(Vec<FieldIssue>),
    /// Domain error raised by a handler with its own stable code.
    #[error("{code}: {message}")]
    Handler { code: String, message: String },
    #[error("command {method} timed out after {budget_ms}ms")]
    Timeout { method: String, budget_ms: u64 },
    #[error("broker publish failed: {0}")]
    BrokerPublish(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl RelayError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            RelayError::Framing(_) => ClientCode::Framing,
            RelayError::BadRequest(_) => ClientCode::BadRequest,
            RelayError::UnresolvedType(_) => ClientCode::UnresolvedType,
            RelayError::UnknownType(_) => ClientCode::UnknownType,
            RelayError::MethodNotFound(_) => ClientCode::MethodNotFound,
            RelayError::Validation(_) => ClientCode::Validation,
            RelayError::Handler { .. } => ClientCode::Internal,
            RelayError::Timeout { .. } => ClientCode::Timeout,
            RelayError::BrokerPublish(_) => ClientCode::BrokerPublish,
            RelayError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Code string placed on the wire. Domain handler errors keep their own code.
    pub fn wire_code(&self) -> &str {
        match self {
            RelayError::Handler { code, .. } => code,
            other => other.client_code().as_str(),
        }
    }

    /// Build a domain-coded handler error.
    pub fn domain(code: impl Into<String>, message: impl Into<String>) -> Self {
        RelayError::Handler {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Human-readable text for the wire; domain errors carry it without the code prefix.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Handler { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::Timeout { .. })
    }
}
