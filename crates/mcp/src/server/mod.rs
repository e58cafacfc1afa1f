mod core;
mod errors;
mod http;
mod schemas;

pub use core::PromptHubServer;
pub use errors::flow_error_to_mcp;
pub use http::{McpHttpServer, RunningMcpHttpServer, resolve_bind_address, serve_stdio};
pub use schemas::{ExecuteFlowRequest, GetTemplateRequest, ListRequest, ValidateFlowRequest};
