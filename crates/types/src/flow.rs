//! Flow document schema.
//!
//! A flow document is exported by the flow editor and stored in the prompt
//! repository under the `flows` directory. Each flow is a small graph whose
//! `template` nodes reference templates by name, whose `multi_input` nodes carry
//! shared variable defaults, and whose `result` nodes are purely presentational.
//!
//! The typed model here is deliberately lenient (most fields default); strict
//! shape checks are performed against the raw JSON by the engine's validator so
//! that offending paths can be reported precisely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::template::VariableValueSet;

/// Container exported by the flow editor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowDocument {
    /// Export metadata.
    pub metadata: FlowDocumentMetadata,
    /// Exported flows. Only the first entry is executed.
    pub flows: Vec<Flow>,
}

impl FlowDocument {
    /// The flow the engine executes.
    pub fn primary_flow(&self) -> Option<&Flow> {
        self.flows.first()
    }
}

/// Export metadata attached to a flow document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowDocumentMetadata {
    /// Export format version.
    #[serde(default)]
    pub version: String,
    /// Export timestamp as written by the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    /// Number of flows the editor reported exporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// A single flow: metadata plus its node and edge lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flow {
    #[serde(flatten)]
    pub meta: FlowMeta,
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

impl Flow {
    /// Template nodes in declaration order.
    pub fn template_nodes(&self) -> Vec<&FlowNode> {
        self.nodes_of_kind(NodeKind::Template)
    }

    /// Multi-input nodes in declaration order.
    pub fn multi_input_nodes(&self) -> Vec<&FlowNode> {
        self.nodes_of_kind(NodeKind::MultiInput)
    }

    pub fn node(&self, node_id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&FlowNode> {
        self.nodes.iter().filter(|node| node.kind == kind).collect()
    }
}

/// Identifying metadata for a flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlowMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Semver-shaped version string (for example `1.0.0`).
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Node classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Renders a template from the repository.
    Template,
    /// Supplies default variable values to every template node.
    MultiInput,
    /// Presentational sink; ignored by the executor.
    Result,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Template => "template",
            NodeKind::MultiInput => "multi_input",
            NodeKind::Result => "result",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "template" => Some(NodeKind::Template),
            "multi_input" => Some(NodeKind::MultiInput),
            "result" => Some(NodeKind::Result),
            _ => None,
        }
    }
}

/// Canvas position written by the editor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// Vertex of a flow graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<NodePosition>,
    #[serde(default)]
    pub data: NodeData,
}

impl FlowNode {
    /// Template referenced by a template node, trimmed.
    pub fn template_id(&self) -> Option<&str> {
        self.data
            .selected_template_id
            .as_deref()
            .map(str::trim)
            .filter(|template_id| !template_id.is_empty())
    }

    pub fn label(&self) -> Option<&str> {
        self.data.label.as_deref()
    }
}

/// Union of the per-kind node payloads.
///
/// Fields that do not apply to a node's kind are simply absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<NodeVariable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_value_sets: Vec<VariableValueSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_saved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_title: Option<String>,
}

/// Variable declared on a node: either a bare name or a `{key, value}` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NodeVariable {
    Name(String),
    Pair {
        key: String,
        #[serde(default)]
        value: Value,
    },
}

impl NodeVariable {
    pub fn name(&self) -> &str {
        match self {
            NodeVariable::Name(name) => name,
            NodeVariable::Pair { key, .. } => key,
        }
    }

    /// Value contributed when the variable comes from a multi-input node.
    pub fn default_value(&self) -> Value {
        match self {
            NodeVariable::Name(_) => Value::String(String::new()),
            NodeVariable::Pair { value: Value::Null, .. } => Value::String(String::new()),
            NodeVariable::Pair { value, .. } => value.clone(),
        }
    }
}

/// Edge classification used for ordering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Informational data wiring; ignored for ordering.
    Data,
    /// Execution dependency between two template nodes.
    Chain,
    /// Connection into a result node.
    Result,
}

impl ConnectionType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "data" => Some(ConnectionType::Data),
            "chain" => Some(ConnectionType::Chain),
            "result" => Some(ConnectionType::Result),
            _ => None,
        }
    }
}

/// Optional edge payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
}

/// Directed connection between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EdgeData>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl FlowEdge {
    /// Classification from `data.connectionType`, falling back to `type`.
    ///
    /// Edges carrying neither (or unrecognised values) are treated as data edges.
    pub fn connection_type(&self) -> ConnectionType {
        self.data
            .as_ref()
            .and_then(|data| data.connection_type.as_deref())
            .and_then(ConnectionType::parse)
            .or_else(|| self.kind.as_deref().and_then(ConnectionType::parse))
            .unwrap_or(ConnectionType::Data)
    }

    pub fn is_chain(&self) -> bool {
        self.connection_type() == ConnectionType::Chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_exported_flow_document() {
        let document: FlowDocument = serde_json::from_value(json!({
            "metadata": { "version": "1.0", "exportedAt": "2024-01-01T00:00:00Z", "count": 1 },
            "flows": [{
                "id": "flow-1",
                "name": "Research",
                "version": "1.0.0",
                "nodes": [
                    { "id": "inputs", "type": "multi_input", "data": { "variables": ["topic", { "key": "tone", "value": "formal" }] } },
                    { "id": "node-1", "type": "template", "position": { "x": 10.0, "y": 20.0 },
                      "data": { "label": "Analyze", "selectedTemplateId": "Topic_Analysis", "variables": ["topic"] } }
                ],
                "edges": [{ "id": "e1", "source": "inputs", "target": "node-1", "data": { "connectionType": "data" } }]
            }]
        }))
        .expect("deserialize flow document");

        let flow = document.primary_flow().expect("flow");
        assert_eq!(flow.meta.id, "flow-1");
        assert_eq!(flow.template_nodes().len(), 1);
        assert_eq!(flow.template_nodes()[0].template_id(), Some("Topic_Analysis"));

        let inputs = flow.multi_input_nodes();
        assert_eq!(inputs[0].data.variables[0].default_value(), json!(""));
        assert_eq!(inputs[0].data.variables[1].name(), "tone");
        assert_eq!(inputs[0].data.variables[1].default_value(), json!("formal"));
    }

    #[test]
    fn edge_classification_prefers_connection_type_over_type() {
        let edge = FlowEdge {
            id: "e".into(),
            source: "a".into(),
            target: "b".into(),
            data: Some(EdgeData {
                connection_type: Some("chain".into()),
            }),
            kind: Some("data".into()),
        };
        assert!(edge.is_chain());

        let fallback = FlowEdge {
            data: None,
            kind: Some("chain".into()),
            ..edge.clone()
        };
        assert!(fallback.is_chain());

        let unknown = FlowEdge {
            data: None,
            kind: Some("smoothstep".into()),
            ..edge
        };
        assert_eq!(unknown.connection_type(), ConnectionType::Data);
    }
}
