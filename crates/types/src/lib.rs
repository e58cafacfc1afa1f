//! Shared type definitions for the prompthub workspace.
//!
//! The flow, template, and execution models mirror the JSON documents stored in
//! the prompt repository. Authoring order is preserved (via `IndexMap` and
//! `Vec`) so execution ordering can fall back to declaration order.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod execution;
pub mod flow;
pub mod template;
pub mod validation;

pub use execution::{ExecutionResult, ExecutionStatus, FailedAt, FlowExecution};
pub use flow::{
    ConnectionType, EdgeData, Flow, FlowDocument, FlowDocumentMetadata, FlowEdge, FlowMeta, FlowNode, NodeData, NodeKind, NodePosition,
    NodeVariable,
};
pub use template::{
    DirectTemplate, LegacyTemplate, Template, TemplateDocument, TemplateVariable, VariableMap, VariableValueSet, WrappedTemplates,
};
pub use validation::{ValidationIssue, ValidationReport};

/// Stable error classification shared by the engine, the source fetchers, and the tool surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    Unauthorized,
    ValidationError,
    FileTooLarge,
    RateLimited,
    ParseError,
    GithubError,
    NetworkError,
    ExecutionError,
    InternalError,
}

impl ErrorCode {
    /// Wire representation used in structured error payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::GithubError => "GITHUB_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ExecutionError => "EXECUTION_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Transport-tier failures the fetcher may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorCode::GithubError | ErrorCode::NetworkError | ErrorCode::RateLimited)
    }

    /// Errors caused by the caller's input rather than the system.
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, ErrorCode::InvalidRequest | ErrorCode::ValidationError | ErrorCode::NotFound)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of document stored in the prompt repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Template,
    Flow,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Template => "template",
            DocumentKind::Flow => "flow",
        }
    }

    /// Repository directory holding documents of this kind unless configured otherwise.
    pub fn default_directory(&self) -> &'static str {
        match self {
            DocumentKind::Template => "templates",
            DocumentKind::Flow => "flows",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
