use std::sync::Arc;

use prompthub_engine::{FlowExecutor, render_template, validate_flow_document};
use prompthub_types::{DocumentKind, VariableMap};
use rmcp::handler::server::{tool::ToolRouter, wrapper::Parameters};
use rmcp::model::{CallToolResult, ErrorData, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool, tool_handler, tool_router};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::server::errors::{flow_error_to_mcp, invalid_params_error};
use crate::server::schemas::{ExecuteFlowRequest, GetTemplateRequest, ListRequest, ValidateFlowRequest};

/// MCP handler exposing the template and flow tools.
#[derive(Clone)]
pub struct PromptHubServer {
    tool_router: ToolRouter<Self>,
    executor: Arc<FlowExecutor>,
    shutdown: CancellationToken,
}

#[tool_router]
impl PromptHubServer {
    /// Create a handler over a shared executor. Running executions stop between
    /// nodes once `shutdown` is cancelled.
    pub fn new(executor: Arc<FlowExecutor>, shutdown: CancellationToken) -> Self {
        Self {
            tool_router: Self::tool_router(),
            executor,
            shutdown,
        }
    }

    #[tool(
        annotations(read_only_hint = true, open_world_hint = true),
        description = "List prompt template names in the repository. Input: optional ref. Returns { templates: [name] } sorted by name."
    )]
    async fn list_templates(&self, param: Parameters<ListRequest>) -> Result<CallToolResult, ErrorData> {
        let reference = self.executor.config().resolve_ref(param.0.reference.as_deref());
        info!(tool = "list_templates", reference = %reference, "tool invoked");
        let names = self
            .executor
            .documents()
            .list_documents(DocumentKind::Template, reference)
            .await
            .map_err(|error| flow_error_to_mcp(&error))?;
        Ok(CallToolResult::structured(json!({ "ref": reference, "templates": names })))
    }

    #[tool(
        annotations(read_only_hint = true, open_world_hint = true),
        description = "Fetch one template and render it. Input: name, optional variables, optional ref. Unknown {placeholders} stay literal. Returns { title, rendered, variables, appliedVariables, variableValueSets }."
    )]
    async fn get_template(&self, param: Parameters<GetTemplateRequest>) -> Result<CallToolResult, ErrorData> {
        let request = param.0;
        info!(tool = "get_template", template = %request.name, "tool invoked");
        let template = self
            .executor
            .fetch_template(&request.name, request.reference.as_deref())
            .await
            .map_err(|error| flow_error_to_mcp(&error))?;
        let rendered = render_template(&template, &request.variables.unwrap_or_default());
        Ok(CallToolResult::structured(json!({
            "title": rendered.title,
            "rendered": rendered.output,
            "variables": template.variables,
            "appliedVariables": rendered.variables,
            "variableValueSets": template.variable_value_sets,
        })))
    }

    #[tool(
        annotations(read_only_hint = true, open_world_hint = true),
        description = "List flow document names in the repository. Input: optional ref. Returns { flows: [name] } sorted by name."
    )]
    async fn list_flows(&self, param: Parameters<ListRequest>) -> Result<CallToolResult, ErrorData> {
        let reference = self.executor.config().resolve_ref(param.0.reference.as_deref());
        info!(tool = "list_flows", reference = %reference, "tool invoked");
        let names = self
            .executor
            .documents()
            .list_documents(DocumentKind::Flow, reference)
            .await
            .map_err(|error| flow_error_to_mcp(&error))?;
        Ok(CallToolResult::structured(json!({ "ref": reference, "flows": names })))
    }

    #[tool(
        annotations(read_only_hint = true, open_world_hint = true),
        description = "Validate a flow document without running it. Input: name of a stored flow or an inline flow, optional ref. Returns { valid, errors: [{ path, message }] }."
    )]
    async fn validate_flow(&self, param: Parameters<ValidateFlowRequest>) -> Result<CallToolResult, ErrorData> {
        let request = param.0;
        info!(tool = "validate_flow", flow = request.name.as_deref().unwrap_or("(inline)"), "tool invoked");
        let document = self
            .flow_document(request.name.as_deref(), request.flow, request.reference.as_deref())
            .await?;
        let report = validate_flow_document(&document);
        Ok(CallToolResult::structured(serde_json::to_value(&report).unwrap_or(Value::Null)))
    }

    #[tool(
        annotations(open_world_hint = true),
        description = "Execute the first flow of a document: template nodes run in dependency order and each sees upstream outputs as {<nodeId>_result} and {<nodeId>_template}. Input: name or inline flow, optional variables, optional ref. Returns { flowName, executionId, finalResult, intermediateResults, totalExecutionTimeMs, status }."
    )]
    async fn execute_flow(&self, param: Parameters<ExecuteFlowRequest>) -> Result<CallToolResult, ErrorData> {
        let request = param.0;
        info!(tool = "execute_flow", flow = request.name.as_deref().unwrap_or("(inline)"), "tool invoked");
        let variables: VariableMap = request.variables.unwrap_or_default();
        let cancellation = self.shutdown.child_token();
        let reference = request.reference.as_deref();

        let execution = match (request.name.as_deref(), request.flow) {
            (Some(name), None) => {
                self.executor
                    .execute_named_flow(name, &variables, reference, &cancellation)
                    .await
            }
            (None, Some(flow)) => {
                self.executor
                    .execute_flow_with_cancellation(&flow, &variables, reference, &cancellation)
                    .await
            }
            (name, flow) => return Err(ambiguous_flow_request(name, flow.is_some())),
        }
        .map_err(|error| flow_error_to_mcp(&error))?;

        Ok(CallToolResult::structured(serde_json::to_value(&execution).unwrap_or(Value::Null)))
    }

    async fn flow_document(&self, name: Option<&str>, flow: Option<Value>, reference: Option<&str>) -> Result<Value, ErrorData> {
        match (name, flow) {
            (Some(name), None) => {
                let reference = self.executor.config().resolve_ref(reference);
                let document = self
                    .executor
                    .documents()
                    .get_document(DocumentKind::Flow, name, reference)
                    .await
                    .map_err(|error| flow_error_to_mcp(&error))?;
                Ok(document.as_ref().clone())
            }
            (None, Some(flow)) => Ok(flow),
            (name, flow) => Err(ambiguous_flow_request(name, flow.is_some())),
        }
    }
}

fn ambiguous_flow_request(name: Option<&str>, has_inline_flow: bool) -> ErrorData {
    invalid_params_error(
        "Provide exactly one of 'name' or 'flow'",
        json!({ "name": name, "inlineFlow": has_inline_flow }),
        "Pass the name of a stored flow, or an inline flow document, but not both.",
    )
}

#[tool_handler]
impl ServerHandler for PromptHubServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: "prompthub".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("PromptHub MCP".to_string()),
                ..Default::default()
            },
            instructions: Some(
                "Prompt templates and flows from a Git repository.\n1) Call list_templates or list_flows to discover names.\n2) Call get_template to render one template with variables.\n3) Call validate_flow before execute_flow when authoring a flow inline.\n4) execute_flow returns every node result; on failure the error context carries failedAt and partialResults.".to_string(),
            ),
        }
    }
}
