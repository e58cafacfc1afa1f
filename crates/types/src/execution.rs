//! Execution records produced by the flow executor.

use serde::{Deserialize, Serialize};

use crate::template::VariableMap;

/// Outcome of rendering a single template node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub node_id: String,
    /// Template identifier the node referenced.
    pub template_name: String,
    /// Variables delivered to the renderer.
    pub input_variables: VariableMap,
    /// Rendered text.
    pub output: String,
    pub execution_time_ms: u64,
}

/// Terminal status of a completed execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Success,
}

/// Result of executing one flow end to end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowExecution {
    pub flow_name: String,
    pub execution_id: String,
    pub intermediate_results: Vec<ExecutionResult>,
    /// Output of the last executed node, or empty when no template node ran.
    pub final_result: String,
    pub total_execution_time_ms: u64,
    pub status: ExecutionStatus,
}

/// Location of an execution failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailedAt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_label: Option<String>,
    pub error: String,
}

impl FailedAt {
    /// Failure that is not attributable to a single node (ordering, cancellation before start).
    pub fn flow_level(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }
}
