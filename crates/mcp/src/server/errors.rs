//! Structured tool error helpers.

use chrono::Utc;
use prompthub_engine::FlowError;
use prompthub_types::ErrorCode;
use rmcp::model::ErrorData;
use serde_json::{Value, json};

fn build_error_data(error_code: &str, category: &str, message: &str, context: Value, retryable: bool, suggested_action: &str) -> Value {
    json!({
        "error_code": error_code,
        "category": category,
        "message": message,
        "context": context,
        "retryable": retryable,
        "suggested_action": suggested_action,
        "correlation_id": format!("prompthub-{}", Utc::now().timestamp_millis()),
    })
}

/// Converts an engine error into MCP error data.
///
/// Caller faults map to `invalid_params` or `resource_not_found`; everything
/// else is an internal error. The `context` object carries the full
/// [`FlowError`] payload, including partial results for execution failures.
pub fn flow_error_to_mcp(error: &FlowError) -> ErrorData {
    let message = error.message.clone();
    let data = build_error_data(
        error.code.as_str(),
        category(error.code),
        &message,
        error.to_payload(),
        error.is_transient(),
        suggested_action(error.code),
    );
    match error.code {
        ErrorCode::NotFound => ErrorData::resource_not_found(message, Some(data)),
        ErrorCode::InvalidRequest | ErrorCode::ValidationError => ErrorData::invalid_params(message, Some(data)),
        _ => ErrorData::internal_error(message, Some(data)),
    }
}

/// Error for requests whose shape is wrong before any engine work starts.
pub fn invalid_params_error(message: impl Into<String>, context: Value, suggested_action: &str) -> ErrorData {
    let message = message.into();
    ErrorData::invalid_params(
        message.clone(),
        Some(build_error_data(
            ErrorCode::InvalidRequest.as_str(),
            "validation",
            &message,
            context,
            false,
            suggested_action,
        )),
    )
}

fn category(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidRequest | ErrorCode::ValidationError => "validation",
        ErrorCode::NotFound => "not_found",
        ErrorCode::Unauthorized => "authorization",
        ErrorCode::RateLimited => "rate_limit",
        ErrorCode::FileTooLarge | ErrorCode::ParseError => "document",
        ErrorCode::GithubError | ErrorCode::NetworkError => "upstream",
        ErrorCode::ExecutionError => "execution",
        ErrorCode::InternalError => "internal",
    }
}

fn suggested_action(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidRequest => "Check the request parameters and resource names, then retry.",
        ErrorCode::ValidationError => "Fix the listed validation errors and resubmit the flow.",
        ErrorCode::NotFound => "Use list_templates or list_flows to find available names, and check the ref.",
        ErrorCode::Unauthorized => "Configure a GitHub token with read access to the repository.",
        ErrorCode::RateLimited => "Wait for the GitHub rate limit to reset, or configure a token.",
        ErrorCode::FileTooLarge => "Reduce the document size or raise maxFileSize.",
        ErrorCode::ParseError => "Fix the document so it is valid JSON in a supported shape.",
        ErrorCode::GithubError | ErrorCode::NetworkError => "Retry later; the repository host could not be reached.",
        ErrorCode::ExecutionError => "Inspect failedAt and partialResults in the context, fix the failing node, and rerun.",
        ErrorCode::InternalError => "Retry; report the correlation id if the problem persists.",
    }
}
