//! Input schemas for RPC methods.
//!
//! Parsing happens in two passes: serde shape checks, then the type's own
//! [`Validate`] rules. Both report [`FieldIssue`]s rather than a single string
//! so clients can attach errors to form fields.

use serde::de::DeserializeOwned;
use serde_json::Value;

use relaywire_core::FieldIssue;

/// Semantic checks run after deserialization.
pub trait Validate {
    fn validate(&self) -> Vec<FieldIssue> {
        Vec::new()
    }
}

/// `parse(input) -> data | issues`.
pub trait InputSchema: Sized {
    fn parse(input: &Value) -> Result<Self, Vec<FieldIssue>>;
}

impl<T> InputSchema for T
where
    T: DeserializeOwned + Validate,
{
    fn parse(input: &Value) -> Result<Self, Vec<FieldIssue>> {
        let value: T = serde_json::from_value(input.clone()).map_err(|e| vec![issue_from_serde(&e)])?;
        let issues = value.validate();
        if issues.is_empty() {
            Ok(value)
        } else {
            Err(issues)
        }
    }
}

/// Best-effort field path from a serde error message.
fn issue_from_serde(e: &serde_json::Error) -> FieldIssue {
    let msg = e.to_string();
    for marker in ["missing field `", "unknown field `", "duplicate field `"] {
        if let Some(rest) = msg.split_once(marker).map(|(_, r)| r) {
            if let Some((field, _)) = rest.split_once('`') {
                return FieldIssue::new(field, msg.clone());
            }
        }
    }
    FieldIssue::new("", msg)
}

/// Push an issue when `value` is blank.
pub fn require_non_empty(issues: &mut Vec<FieldIssue>, path: &str, value: &str) {
    if value.trim().is_empty() {
        issues.push(FieldIssue::new(path, "must not be empty"));
    }
}
