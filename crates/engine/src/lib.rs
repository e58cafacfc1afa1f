//! # Prompthub Engine
//!
//! The engine validates flow documents, orders their template nodes, and
//! renders each node in turn, feeding every rendered output into the nodes
//! that follow it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use prompthub_engine::{DocumentSource, DocumentStore, EngineConfig, FlowExecutor};
//! use prompthub_types::VariableMap;
//!
//! # async fn run(source: Arc<dyn DocumentSource>, flow_document: serde_json::Value) -> Result<(), prompthub_engine::FlowError> {
//! let config = EngineConfig::default();
//! let store = Arc::new(DocumentStore::new(source, &config));
//! let executor = FlowExecutor::new(store, config);
//!
//! let mut variables = VariableMap::new();
//! variables.insert("topic".into(), "rust".into());
//! let execution = executor.execute_flow(&flow_document, &variables, None).await?;
//! println!("{}", execution.final_result);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`validation`**: structural and semantic checks over raw flow JSON
//! - **`ordering`**: topological ordering of template nodes along chain edges
//! - **`variables`**: per-node variable resolution
//! - **`templates`**: template normalisation and `{name}` rendering
//! - **`documents`**: TTL cache with single-flight fetches over a [`DocumentSource`]
//! - **`executor`**: the sequential execution loop
//! - **`error`**: the [`FlowError`] model shared by all of the above

pub mod config;
pub mod documents;
pub mod error;
pub mod executor;
pub mod ordering;
pub mod templates;
pub mod validation;
pub mod variables;

pub use config::EngineConfig;
pub use documents::{DocumentSource, DocumentStore, FetchOutcome, cache_key};
pub use error::FlowError;
pub use executor::{ExecutionPhase, FlowExecutor};
pub use ordering::order_template_nodes;
pub use templates::{RenderedTemplate, extract_placeholders, normalize_template, render_template};
pub use validation::{parse_flow_document, validate_flow_document};
pub use variables::resolve_node_variables;
