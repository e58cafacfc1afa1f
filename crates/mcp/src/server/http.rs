//! Stdio and streamable HTTP hosting for the tool server.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::Router;
use prompthub_engine::FlowExecutor;
use rmcp::ServiceExt;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::server::core::PromptHubServer;

/// Serve the tools over stdin/stdout until the client disconnects.
pub async fn serve_stdio(executor: Arc<FlowExecutor>, shutdown: CancellationToken) -> Result<()> {
    info!("serving MCP over stdio");
    let service = PromptHubServer::new(executor, shutdown)
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to start stdio MCP session")?;
    service.waiting().await.context("stdio MCP session ended abnormally")?;
    Ok(())
}

/// Host configuration for a local MCP HTTP server instance.
#[derive(Debug, Clone)]
pub struct McpHttpServer {
    bind_address: SocketAddr,
    executor: Arc<FlowExecutor>,
}

impl McpHttpServer {
    pub fn new(bind_address: SocketAddr, executor: Arc<FlowExecutor>) -> Self {
        Self { bind_address, executor }
    }

    /// Start the server and return a handle for shutdown.
    pub async fn start(self) -> Result<RunningMcpHttpServer> {
        let cancellation_token = CancellationToken::new();
        let session_manager = Arc::new(LocalSessionManager::default());

        let executor = Arc::clone(&self.executor);
        let execution_shutdown = cancellation_token.child_token();
        let service: StreamableHttpService<PromptHubServer, LocalSessionManager> = StreamableHttpService::new(
            move || Ok(PromptHubServer::new(Arc::clone(&executor), execution_shutdown.clone())),
            session_manager,
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: None,
                cancellation_token: cancellation_token.child_token(),
                ..Default::default()
            },
        );

        let router = Router::new().nest_service("/mcp", service);
        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .with_context(|| format!("failed to bind MCP HTTP server to {}", self.bind_address))?;
        let bound_address = listener.local_addr()?;
        info!(address = %bound_address, "serving MCP over streamable HTTP at /mcp");

        let server_handle = tokio::spawn({
            let shutdown = cancellation_token.child_token();
            async move {
                let _ = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await;
            }
        });

        Ok(RunningMcpHttpServer {
            bind_address: bound_address,
            cancellation_token,
            server_handle,
        })
    }
}

/// Runtime handle for a running MCP HTTP server.
#[derive(Debug)]
pub struct RunningMcpHttpServer {
    bind_address: SocketAddr,
    cancellation_token: CancellationToken,
    server_handle: JoinHandle<()>,
}

impl RunningMcpHttpServer {
    pub fn bound_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Stop accepting requests, cancel running executions, and wait for the server task.
    pub async fn stop(self) -> Result<()> {
        self.cancellation_token.cancel();
        self.server_handle
            .await
            .map_err(|error| anyhow!("MCP HTTP server task failed: {error}"))?;
        Ok(())
    }
}

/// Resolve a safe local bind address for the MCP HTTP server.
pub fn resolve_bind_address(bind_address: &str) -> Result<SocketAddr> {
    let parsed: SocketAddr = bind_address
        .parse()
        .map_err(|error| anyhow!("invalid MCP HTTP bind address '{bind_address}': {error}"))?;
    if !is_loopback(parsed.ip()) {
        return Err(anyhow!("MCP HTTP server must bind to a loopback address"));
    }
    Ok(parsed)
}

fn is_loopback(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(ip) => ip.is_loopback(),
        IpAddr::V6(ip) => ip.is_loopback(),
    }
}
