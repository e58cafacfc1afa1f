//! Fetcher error types.

use prompthub_engine::FlowError;
use prompthub_types::ErrorCode;
use prompthub_util::ResourceNameError;
use serde_json::{Value, json};
use thiserror::Error;

/// Failure while loading a document from a source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error(transparent)]
    InvalidName(#[from] ResourceNameError),

    #[error("'{path}' was not found at ref '{reference}'")]
    NotFound { path: String, reference: String },

    #[error("the repository rejected the request credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("rate limit exceeded while fetching '{path}'")]
    RateLimited { path: String, reset_at: Option<String> },

    #[error("'{path}' is {size} bytes, above the {limit} byte limit")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("'{path}' is not valid JSON: {message}")]
    Parse { path: String, message: String },

    #[error("repository rejected the request for '{path}' (HTTP {status})")]
    Rejected { path: String, status: u16 },

    #[error("repository returned HTTP {status} for '{path}'")]
    Upstream { path: String, status: u16 },

    #[error("request for '{path}' failed: {message}")]
    Network { path: String, message: String },

    #[error("failed to read '{path}': {message}")]
    Io { path: String, message: String },

    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl SourceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SourceError::InvalidName(_) | SourceError::Config(_) | SourceError::Rejected { .. } => ErrorCode::InvalidRequest,
            SourceError::NotFound { .. } => ErrorCode::NotFound,
            SourceError::Unauthorized { .. } => ErrorCode::Unauthorized,
            SourceError::RateLimited { .. } => ErrorCode::RateLimited,
            SourceError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            SourceError::Parse { .. } => ErrorCode::ParseError,
            SourceError::Upstream { .. } => ErrorCode::GithubError,
            SourceError::Network { .. } => ErrorCode::NetworkError,
            SourceError::Io { .. } => ErrorCode::InternalError,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.code().is_transient()
    }

    fn details(&self) -> Option<Value> {
        match self {
            SourceError::NotFound { path, reference } => Some(json!({ "path": path, "ref": reference })),
            SourceError::Unauthorized { status } => Some(json!({ "status": status })),
            SourceError::RateLimited { path, reset_at } => Some(json!({ "path": path, "resetAt": reset_at })),
            SourceError::FileTooLarge { path, size, limit } => Some(json!({ "path": path, "size": size, "limit": limit })),
            SourceError::Upstream { path, status } | SourceError::Rejected { path, status } => Some(json!({ "path": path, "status": status })),
            _ => None,
        }
    }

    /// Converts into the engine error model, tagging the originating subsystem.
    pub fn into_flow_error(self, subsystem: &str) -> FlowError {
        let error = FlowError::new(self.code(), subsystem, self.to_string());
        match self.details() {
            Some(details) => error.with_details(details),
            None => error,
        }
    }
}
