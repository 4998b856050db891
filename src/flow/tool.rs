// SPDX-License-Identifier: MIT

//! Tool contract: the uniform interface every callable capability exposes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trait for tools callable from the `execute_tools` node.
///
/// `call` is total: it must never panic or return `Err`. Internal failures
/// (bad arguments, workbook errors, nothing found) come back as
/// `ToolResult::fail`, so one broken tool can never take down the turn.
///
/// `name()`, `description()` and `schema()` return references to avoid
/// allocation on every access; implementations store these in struct fields
/// or statics.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (must be unique within a registry)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's input parameters
    fn schema(&self) -> &Value;

    /// Execute the tool with the given arguments
    async fn call(&self, args: Value) -> ToolResult;
}

/// A requested tool invocation: name plus JSON arguments.
///
/// Produced by `select_tools`, consumed by `execute_tools`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The uniform success/error shape every tool returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    /// Structured payload; present on success, and on failure when the tool
    /// has something useful to report alongside the error (e.g. the list of
    /// metrics that do exist)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Successful result with a structured payload
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed result carrying only an error message
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Failed result that still carries a structured payload
    pub fn fail_with(error: impl Into<String>, payload: Value) -> Self {
        Self {
            success: false,
            payload: Some(payload),
            error: Some(error.into()),
        }
    }

    /// Pull a string field out of the payload, if present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.as_ref()?.get(key)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_result() {
        let r = ToolResult::ok(json!({"value": "25.3%"}));
        assert!(r.success);
        assert_eq!(r.payload_str("value"), Some("25.3%"));
        assert!(r.error.is_none());
    }

    #[test]
    fn test_fail_result() {
        let r = ToolResult::fail("not found");
        assert!(!r.success);
        assert!(r.payload.is_none());
        assert_eq!(r.error.as_deref(), Some("not found"));
    }

    #[test]
    fn test_fail_with_payload() {
        let r = ToolResult::fail_with("not found", json!({"availableMetrics": ["IRR"]}));
        assert!(!r.success);
        assert!(r.payload.is_some());
        assert_eq!(r.error.as_deref(), Some("not found"));
    }

    #[test]
    fn test_tool_spec_roundtrip() {
        let spec = ToolSpec::new("find_financial_metric", json!({"metricName": "IRR"}));
        let text = serde_json::to_string(&spec).unwrap();
        let back: ToolSpec = serde_json::from_str(&text).unwrap();
        assert_eq!(back, spec);
    }
}
