//! Error model shared by every engine component.
//!
//! A [`FlowError`] always carries a stable [`ErrorCode`] plus the subsystem tag
//! that raised it. Execution failures additionally carry everything that
//! completed before the failure (`partial_results`) and where it happened
//! (`failed_at`).

use prompthub_types::{ErrorCode, ExecutionResult, FailedAt, ValidationReport};
use prompthub_util::ResourceNameError;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

pub const SOURCE_FLOW_VALIDATE: &str = "flows/validate";
pub const SOURCE_FLOW_EXECUTE: &str = "flows/execute";
pub const SOURCE_TEMPLATE_RENDER: &str = "templates/render";
pub const SOURCE_DOCUMENT_STORE: &str = "documents/store";

/// Structured engine error.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct FlowError {
    pub code: ErrorCode,
    pub message: String,
    /// Subsystem tag such as `flows/execute`.
    #[serde(rename = "source")]
    pub subsystem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_results: Option<Vec<ExecutionResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<FailedAt>,
}

impl FlowError {
    pub fn new(code: ErrorCode, subsystem: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            subsystem: subsystem.into(),
            details: None,
            partial_results: None,
            failed_at: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_request(subsystem: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, subsystem, message)
    }

    pub fn not_found(subsystem: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, subsystem, message)
    }

    pub fn parse(subsystem: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, subsystem, message)
    }

    pub fn internal(subsystem: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, subsystem, message)
    }

    /// Rejection of a flow document by the schema validator.
    pub fn validation(report: &ValidationReport) -> Self {
        Self::new(
            ErrorCode::ValidationError,
            SOURCE_FLOW_VALIDATE,
            format!("Flow validation failed: {}", report.summary()),
        )
        .with_details(json!({ "errors": report.errors }))
    }

    /// Execution failure carrying the results completed so far.
    pub fn execution(message: impl Into<String>, partial_results: Vec<ExecutionResult>, failed_at: FailedAt) -> Self {
        Self {
            partial_results: Some(partial_results),
            failed_at: Some(failed_at),
            ..Self::new(ErrorCode::ExecutionError, SOURCE_FLOW_EXECUTE, message)
        }
    }

    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }

    /// Results completed before the failure; empty for non-execution errors.
    pub fn partial_results(&self) -> &[ExecutionResult] {
        self.partial_results.as_deref().unwrap_or_default()
    }

    /// JSON payload handed to tool callers.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "code": self.code, "message": self.message }))
    }
}

impl From<ResourceNameError> for FlowError {
    fn from(error: ResourceNameError) -> Self {
        FlowError::invalid_request(SOURCE_DOCUMENT_STORE, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prompthub_types::ValidationIssue;

    #[test]
    fn execution_error_payload_carries_partial_results_and_location() {
        let error = FlowError::execution(
            "Node \"Summarise\" failed: template missing",
            Vec::new(),
            FailedAt {
                node_id: Some("node-2".into()),
                template_name: Some("Summary".into()),
                node_label: Some("Summarise".into()),
                error: "template missing".into(),
            },
        );

        let payload = error.to_payload();
        assert_eq!(payload["code"], "EXECUTION_ERROR");
        assert_eq!(payload["source"], "flows/execute");
        assert_eq!(payload["partialResults"], json!([]));
        assert_eq!(payload["failedAt"]["nodeId"], "node-2");
    }

    #[test]
    fn validation_error_lists_every_issue() {
        let report = ValidationReport::from_issues(vec![
            ValidationIssue::new("flows[0].nodes[1].id", "Duplicate node ID: \"a\""),
            ValidationIssue::new("flows[0].edges[0]", "Edge \"e1\" connects node \"b\" to itself"),
        ]);

        let error = FlowError::validation(&report);
        assert_eq!(error.code, ErrorCode::ValidationError);
        assert!(error.message.contains("Duplicate node ID"));
        assert_eq!(error.details.as_ref().map(|details| details["errors"].as_array().map(Vec::len)), Some(Some(2)));
        assert!(error.partial_results().is_empty());
    }

    #[test]
    fn resource_name_errors_become_invalid_requests() {
        let error: FlowError = ResourceNameError::Empty.into();
        assert_eq!(error.code, ErrorCode::InvalidRequest);
        assert!(!error.is_transient());
    }
}
