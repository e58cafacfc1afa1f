//! Model Context Protocol (MCP) tool surface for prompthub.
//!
//! This crate wires configuration, the document sources, and the flow engine
//! into an rmcp tool server that can be hosted over stdio or streamable HTTP.

pub mod config;
pub mod runtime;
pub mod server;

pub use config::{BrokerConfig, ConfigError};
pub use runtime::build_executor;
pub use server::{McpHttpServer, PromptHubServer, RunningMcpHttpServer, resolve_bind_address, serve_stdio};
