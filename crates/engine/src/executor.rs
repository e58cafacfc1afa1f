//! Sequential flow execution.
//!
//! An execution moves through `validating → ordering → running → completed`,
//! or to `aborted` on the first failure. Template nodes run one at a time in
//! the order produced by [`order_template_nodes`]; each node sees the outputs
//! of every node that ran before it. Failures after validation are wrapped in
//! an `EXECUTION_ERROR` carrying the completed results and the failing node.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use prompthub_types::{DocumentKind, ExecutionResult, ExecutionStatus, FailedAt, FlowExecution, FlowNode, Template, VariableMap};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::EngineConfig,
    documents::DocumentStore,
    error::{FlowError, SOURCE_FLOW_EXECUTE},
    ordering::order_template_nodes,
    templates::{RenderedTemplate, normalize_template, render_template},
    validation::parse_flow_document,
    variables::{base_variables, multi_input_contributions, resolve_node_variables},
};

/// Lifecycle of a single execution, reported in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Created,
    Validating,
    Ordering,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionPhase::Created => "created",
            ExecutionPhase::Validating => "validating",
            ExecutionPhase::Ordering => "ordering",
            ExecutionPhase::Running => "running",
            ExecutionPhase::Completed => "completed",
            ExecutionPhase::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Executes flow documents against a [`DocumentStore`].
#[derive(Debug)]
pub struct FlowExecutor {
    documents: Arc<DocumentStore>,
    config: EngineConfig,
    last_execution_stamp: AtomicU64,
}

impl FlowExecutor {
    pub fn new(documents: Arc<DocumentStore>, config: EngineConfig) -> Self {
        Self {
            documents,
            config,
            last_execution_stamp: AtomicU64::new(0),
        }
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes the first flow of `document`.
    pub async fn execute_flow(&self, document: &Value, initial_variables: &VariableMap, reference: Option<&str>) -> Result<FlowExecution, FlowError> {
        self.execute_flow_with_cancellation(document, initial_variables, reference, &CancellationToken::new())
            .await
    }

    /// Fetches the named flow document and executes it.
    pub async fn execute_named_flow(
        &self,
        name: &str,
        initial_variables: &VariableMap,
        reference: Option<&str>,
        cancellation: &CancellationToken,
    ) -> Result<FlowExecution, FlowError> {
        let reference = self.config.resolve_ref(reference);
        let document = self.documents.get_document(DocumentKind::Flow, name, reference).await?;
        self.execute_flow_with_cancellation(&document, initial_variables, Some(reference), cancellation)
            .await
    }

    /// Executes the first flow of `document`, stopping between nodes once `cancellation` fires.
    ///
    /// A node that is already rendering when cancellation is requested runs to
    /// completion; its result is included in the error's partial results.
    pub async fn execute_flow_with_cancellation(
        &self,
        document: &Value,
        initial_variables: &VariableMap,
        reference: Option<&str>,
        cancellation: &CancellationToken,
    ) -> Result<FlowExecution, FlowError> {
        let started = Instant::now();
        let reference = self.config.resolve_ref(reference);
        let mut phase = ExecutionPhase::Created;

        advance(&mut phase, ExecutionPhase::Validating);
        let parsed = parse_flow_document(document).inspect_err(|_| advance(&mut phase, ExecutionPhase::Aborted))?;
        let Some(flow) = parsed.primary_flow() else {
            return Err(FlowError::internal(SOURCE_FLOW_EXECUTE, "validated flow document has no flows"));
        };
        let flow_name = if flow.meta.name.trim().is_empty() { flow.meta.id.clone() } else { flow.meta.name.clone() };
        let execution_id = format!("{}_{}", flow_name, self.next_execution_stamp());

        advance(&mut phase, ExecutionPhase::Ordering);
        let template_nodes = flow.template_nodes();
        let ordered = order_template_nodes(&template_nodes, &flow.edges).inspect_err(|_| advance(&mut phase, ExecutionPhase::Aborted))?;

        let base = base_variables(&multi_input_contributions(flow), initial_variables);

        advance(&mut phase, ExecutionPhase::Running);
        info!(flow = %flow_name, execution_id = %execution_id, node_count = ordered.len(), reference = %reference, "flow execution started");

        let mut completed: Vec<ExecutionResult> = Vec::with_capacity(ordered.len());
        for node in ordered {
            if cancellation.is_cancelled() {
                advance(&mut phase, ExecutionPhase::Aborted);
                return Err(cancelled(&flow_name, completed));
            }

            let variables = resolve_node_variables(&base, initial_variables, &completed);
            match self.run_node(node, variables, reference).await {
                Ok(result) => {
                    debug!(
                        flow = %flow_name,
                        node_id = %result.node_id,
                        template = %result.template_name,
                        elapsed_ms = result.execution_time_ms,
                        "template node rendered"
                    );
                    completed.push(result);
                }
                Err(error) => {
                    advance(&mut phase, ExecutionPhase::Aborted);
                    warn!(flow = %flow_name, node_id = %node.id, code = %error.code, error = %error, "template node failed");
                    return Err(node_failure(node, error, completed));
                }
            }
        }

        if cancellation.is_cancelled() {
            advance(&mut phase, ExecutionPhase::Aborted);
            return Err(cancelled(&flow_name, completed));
        }

        advance(&mut phase, ExecutionPhase::Completed);
        let total_execution_time_ms = elapsed_millis(started);
        info!(
            flow = %flow_name,
            execution_id = %execution_id,
            node_count = completed.len(),
            elapsed_ms = total_execution_time_ms,
            "flow execution completed"
        );

        Ok(FlowExecution {
            flow_name,
            execution_id,
            final_result: completed.last().map(|result| result.output.clone()).unwrap_or_default(),
            intermediate_results: completed,
            total_execution_time_ms,
            status: ExecutionStatus::Success,
        })
    }

    /// Fetches and normalises a template by name.
    pub async fn fetch_template(&self, name: &str, reference: Option<&str>) -> Result<Template, FlowError> {
        let reference = self.config.resolve_ref(reference);
        let document = self.documents.get_document(DocumentKind::Template, name, reference).await?;
        normalize_template(&document)
    }

    /// Fetches, normalises, and renders a single template by name.
    pub async fn render_named_template(&self, name: &str, variables: &VariableMap, reference: Option<&str>) -> Result<RenderedTemplate, FlowError> {
        let template = self.fetch_template(name, reference).await?;
        Ok(render_template(&template, variables))
    }

    async fn run_node(&self, node: &FlowNode, variables: VariableMap, reference: &str) -> Result<ExecutionResult, FlowError> {
        let started = Instant::now();
        let template_name = node
            .template_id()
            .ok_or_else(|| FlowError::internal(SOURCE_FLOW_EXECUTE, format!("template node '{}' has no selectedTemplateId", node.id)))?;

        let document = self.documents.get_document(DocumentKind::Template, template_name, reference).await?;
        let template = normalize_template(&document)?;
        let rendered = render_template(&template, &variables);

        Ok(ExecutionResult {
            node_id: node.id.clone(),
            template_name: template_name.to_string(),
            input_variables: variables,
            output: rendered.output,
            execution_time_ms: elapsed_millis(started),
        })
    }

    /// Millisecond timestamp, strictly increasing per executor.
    fn next_execution_stamp(&self) -> u64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_millis() as u64).unwrap_or_default();
        let mut last = self.last_execution_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last_execution_stamp
                .compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }
}

fn advance(phase: &mut ExecutionPhase, next: ExecutionPhase) {
    debug!(from = %phase, to = %next, "execution phase change");
    *phase = next;
}

fn node_failure(node: &FlowNode, error: FlowError, completed: Vec<ExecutionResult>) -> FlowError {
    let display_name = node.label().unwrap_or(node.id.as_str());
    let failed_at = FailedAt {
        node_id: Some(node.id.clone()),
        template_name: node.template_id().map(str::to_string),
        node_label: node.label().map(str::to_string),
        error: error.message.clone(),
    };
    FlowError::execution(format!("Node \"{display_name}\" failed: {}", error.message), completed, failed_at).with_details(json!({
        "originalCode": error.code,
        "originalSource": error.subsystem,
        "originalDetails": error.details,
    }))
}

fn cancelled(flow_name: &str, completed: Vec<ExecutionResult>) -> FlowError {
    let message = format!("Execution of flow \"{flow_name}\" was cancelled");
    FlowError::execution(message.clone(), completed, FailedAt::flow_level(message))
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{DocumentSource, FetchOutcome};
    use async_trait::async_trait;

    struct EmptySource;

    #[async_trait]
    impl DocumentSource for EmptySource {
        async fn fetch_document(&self, _: DocumentKind, name: &str, _: &str, _: Option<&str>) -> Result<FetchOutcome, FlowError> {
            Err(FlowError::not_found("test", format!("'{name}' not found")))
        }

        async fn list_documents(&self, _: DocumentKind, _: &str) -> Result<Vec<String>, FlowError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn execution_stamps_strictly_increase() {
        let store = Arc::new(DocumentStore::new(Arc::new(EmptySource), &EngineConfig::default()));
        let executor = FlowExecutor::new(store, EngineConfig::default());

        let first = executor.next_execution_stamp();
        let second = executor.next_execution_stamp();
        assert!(second > first);
    }

    #[test]
    fn phases_render_lowercase() {
        assert_eq!(ExecutionPhase::Validating.to_string(), "validating");
        assert_eq!(ExecutionPhase::Aborted.to_string(), "aborted");
    }
}
