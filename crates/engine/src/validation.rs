//! Flow document validation.
//!
//! Validation runs in two phases. The structural phase walks the raw JSON and
//! stops at the first value with the wrong presence, shape, or type. Only a
//! structurally sound document reaches the semantic phase, which aggregates
//! every cross-reference problem it finds (duplicate ids, dangling edges, self
//! loops, incomplete nodes).

use std::collections::HashSet;

use once_cell::sync::Lazy;
use prompthub_types::{ConnectionType, Flow, FlowDocument, NodeKind, ValidationIssue, ValidationReport};
use regex::Regex;
use serde_json::{Map as JsonMap, Value};
use tracing::debug;

use crate::error::{FlowError, SOURCE_FLOW_VALIDATE};

static SEMVER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$").expect("semver regex should compile")
});

const ROOT_PATH: &str = "(root)";

/// Validates a flow document and reports every problem found.
pub fn validate_flow_document(document: &Value) -> ValidationReport {
    if let Err(issue) = check_document_structure(document) {
        debug!(path = %issue.path, "flow document failed structural validation");
        return ValidationReport::from_issues(vec![issue]);
    }

    match serde_json::from_value::<FlowDocument>(document.clone()) {
        Ok(parsed) => {
            let issues = parsed
                .flows
                .iter()
                .enumerate()
                .flat_map(|(flow_index, flow)| semantic_issues(flow_index, flow))
                .collect();
            ValidationReport::from_issues(issues)
        }
        Err(error) => ValidationReport::from_issues(vec![ValidationIssue::new(ROOT_PATH, error.to_string())]),
    }
}

/// Validates and deserializes a flow document.
pub fn parse_flow_document(document: &Value) -> Result<FlowDocument, FlowError> {
    let report = validate_flow_document(document);
    if !report.valid {
        return Err(FlowError::validation(&report));
    }
    serde_json::from_value(document.clone()).map_err(|error| FlowError::parse(SOURCE_FLOW_VALIDATE, error.to_string()))
}

fn semantic_issues(flow_index: usize, flow: &Flow) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let flow_path = format!("flows[{flow_index}]");

    let mut node_ids = HashSet::new();
    for (node_index, node) in flow.nodes.iter().enumerate() {
        let node_path = format!("{flow_path}.nodes[{node_index}]");
        if !node_ids.insert(node.id.as_str()) {
            issues.push(
                ValidationIssue::new(format!("{node_path}.id"), format!("Duplicate node ID: \"{}\"", node.id)).with_param("id", node.id.as_str()),
            );
        }

        match node.kind {
            NodeKind::Template => {
                if node.template_id().is_none() {
                    issues.push(
                        ValidationIssue::new(
                            format!("{node_path}.data.selectedTemplateId"),
                            format!("Template node \"{}\" is missing selectedTemplateId", node.id),
                        )
                        .with_param("nodeId", node.id.as_str()),
                    );
                }
                if node.data.variables.is_empty() {
                    issues.push(
                        ValidationIssue::new(
                            format!("{node_path}.data.variables"),
                            format!("Template node \"{}\" must declare at least one variable", node.id),
                        )
                        .with_param("nodeId", node.id.as_str()),
                    );
                }
            }
            NodeKind::MultiInput if node.data.variables.is_empty() => {
                issues.push(
                    ValidationIssue::new(
                        format!("{node_path}.data.variables"),
                        format!("Multi-input node \"{}\" must declare at least one variable", node.id),
                    )
                    .with_param("nodeId", node.id.as_str()),
                );
            }
            _ => {}
        }
    }

    let mut edge_ids = HashSet::new();
    for (edge_index, edge) in flow.edges.iter().enumerate() {
        let edge_path = format!("{flow_path}.edges[{edge_index}]");
        if !edge_ids.insert(edge.id.as_str()) {
            issues.push(
                ValidationIssue::new(format!("{edge_path}.id"), format!("Duplicate edge ID: \"{}\"", edge.id)).with_param("id", edge.id.as_str()),
            );
        }
        for (field, endpoint) in [("source", &edge.source), ("target", &edge.target)] {
            if !node_ids.contains(endpoint.as_str()) {
                issues.push(
                    ValidationIssue::new(
                        format!("{edge_path}.{field}"),
                        format!("Edge \"{}\" references unknown {field} node \"{endpoint}\"", edge.id),
                    )
                    .with_param("edgeId", edge.id.as_str())
                    .with_param("nodeId", endpoint.as_str()),
                );
            }
        }
        if edge.source == edge.target {
            issues.push(
                ValidationIssue::new(edge_path, format!("Edge \"{}\" connects node \"{}\" to itself", edge.id, edge.source))
                    .with_param("edgeId", edge.id.as_str()),
            );
        }
    }

    issues
}

fn check_document_structure(document: &Value) -> Result<(), ValidationIssue> {
    let root = expect_object(document, ROOT_PATH)?;

    let metadata = expect_object(required(root, "metadata", ROOT_PATH)?, "metadata")?;
    expect_string(required(metadata, "version", "metadata")?, "metadata.version")?;
    optional_string(metadata, "exportedAt", "metadata")?;
    if let Some(count) = metadata.get("count")
        && count.as_u64().is_none()
    {
        return Err(type_issue("metadata.count", "a non-negative integer", count));
    }

    let flows = expect_array(required(root, "flows", ROOT_PATH)?, "flows")?;
    if flows.is_empty() {
        return Err(ValidationIssue::new("flows", "must contain at least one flow"));
    }
    for (flow_index, flow) in flows.iter().enumerate() {
        check_flow_structure(flow, &format!("flows[{flow_index}]"))?;
    }
    Ok(())
}

fn check_flow_structure(flow: &Value, path: &str) -> Result<(), ValidationIssue> {
    let flow = expect_object(flow, path)?;
    expect_non_empty_string(required(flow, "id", path)?, &format!("{path}.id"))?;
    expect_string(required(flow, "name", path)?, &format!("{path}.name"))?;

    let version_path = format!("{path}.version");
    let version = expect_string(required(flow, "version", path)?, &version_path)?;
    if !SEMVER_REGEX.is_match(version) {
        return Err(ValidationIssue::new(version_path, format!("\"{version}\" is not a semantic version")).with_param("version", version));
    }
    for field in ["description", "created_at", "updated_at"] {
        optional_string(flow, field, path)?;
    }

    let nodes_path = format!("{path}.nodes");
    let nodes = expect_array(required(flow, "nodes", path)?, &nodes_path)?;
    if nodes.is_empty() {
        return Err(ValidationIssue::new(nodes_path, "must contain at least one node"));
    }
    for (node_index, node) in nodes.iter().enumerate() {
        check_node_structure(node, &format!("{nodes_path}[{node_index}]"))?;
    }

    let edges_path = format!("{path}.edges");
    let edges = expect_array(required(flow, "edges", path)?, &edges_path)?;
    for (edge_index, edge) in edges.iter().enumerate() {
        check_edge_structure(edge, &format!("{edges_path}[{edge_index}]"))?;
    }
    Ok(())
}

fn check_node_structure(node: &Value, path: &str) -> Result<(), ValidationIssue> {
    let node = expect_object(node, path)?;
    expect_non_empty_string(required(node, "id", path)?, &format!("{path}.id"))?;

    let kind_path = format!("{path}.type");
    let raw_kind = expect_string(required(node, "type", path)?, &kind_path)?;
    let kind = NodeKind::parse(raw_kind).ok_or_else(|| {
        ValidationIssue::new(&kind_path, format!("unknown node type \"{raw_kind}\"; expected template, multi_input, or result"))
            .with_param("type", raw_kind)
    })?;

    if let Some(position) = node.get("position") {
        let position_path = format!("{path}.position");
        let position = expect_object(position, &position_path)?;
        for axis in ["x", "y"] {
            let axis_value = required(position, axis, &position_path)?;
            if !axis_value.is_number() {
                return Err(type_issue(&format!("{position_path}.{axis}"), "a number", axis_value));
            }
        }
    }

    let data_path = format!("{path}.data");
    let data = expect_object(required(node, "data", path)?, &data_path)?;
    optional_string(data, "label", &data_path)?;

    match kind {
        NodeKind::Template => {
            optional_string(data, "selectedTemplateId", &data_path)?;
            if let Some(variables) = data.get("variables") {
                let variables_path = format!("{data_path}.variables");
                for (index, variable) in expect_array(variables, &variables_path)?.iter().enumerate() {
                    expect_string(variable, &format!("{variables_path}[{index}]"))?;
                }
            }
            if let Some(value_sets) = data.get("variableValueSets") {
                let sets_path = format!("{data_path}.variableValueSets");
                for (index, value_set) in expect_array(value_sets, &sets_path)?.iter().enumerate() {
                    let set_path = format!("{sets_path}[{index}]");
                    let value_set = expect_object(value_set, &set_path)?;
                    expect_string(required(value_set, "name", &set_path)?, &format!("{set_path}.name"))?;
                    if let Some(values) = value_set.get("values") {
                        expect_object(values, &format!("{set_path}.values"))?;
                    }
                }
            }
        }
        NodeKind::MultiInput => {
            if let Some(variables) = data.get("variables") {
                let variables_path = format!("{data_path}.variables");
                for (index, variable) in expect_array(variables, &variables_path)?.iter().enumerate() {
                    let variable_path = format!("{variables_path}[{index}]");
                    match variable {
                        Value::String(_) => {}
                        Value::Object(pair) => {
                            expect_string(required(pair, "key", &variable_path)?, &format!("{variable_path}.key"))?;
                        }
                        other => return Err(type_issue(&variable_path, "a variable name or {key, value} object", other)),
                    }
                }
            }
        }
        NodeKind::Result => {
            optional_string(data, "templateTitle", &data_path)?;
            if let Some(is_saved) = data.get("isSaved")
                && !is_saved.is_boolean()
            {
                return Err(type_issue(&format!("{data_path}.isSaved"), "a boolean", is_saved));
            }
        }
    }
    Ok(())
}

fn check_edge_structure(edge: &Value, path: &str) -> Result<(), ValidationIssue> {
    let edge = expect_object(edge, path)?;
    for field in ["id", "source", "target"] {
        expect_non_empty_string(required(edge, field, path)?, &format!("{path}.{field}"))?;
    }
    optional_string(edge, "type", path)?;
    if let Some(data) = edge.get("data") {
        let data_path = format!("{path}.data");
        let data = expect_object(data, &data_path)?;
        if let Some(raw) = optional_string(data, "connectionType", &data_path)?
            && ConnectionType::parse(raw).is_none()
        {
            return Err(ValidationIssue::new(
                format!("{data_path}.connectionType"),
                format!("unknown connection type \"{raw}\"; expected data, chain, or result"),
            )
            .with_param("connectionType", raw));
        }
    }
    Ok(())
}

fn required<'a>(object: &'a JsonMap<String, Value>, field: &str, parent_path: &str) -> Result<&'a Value, ValidationIssue> {
    object.get(field).ok_or_else(|| {
        let path = if parent_path == ROOT_PATH { field.to_string() } else { format!("{parent_path}.{field}") };
        ValidationIssue::new(path, format!("missing required field \"{field}\"")).with_param("field", field)
    })
}

fn optional_string<'a>(object: &'a JsonMap<String, Value>, field: &str, parent_path: &str) -> Result<Option<&'a str>, ValidationIssue> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => expect_string(value, &format!("{parent_path}.{field}")).map(Some),
    }
}

fn expect_object<'a>(value: &'a Value, path: &str) -> Result<&'a JsonMap<String, Value>, ValidationIssue> {
    value.as_object().ok_or_else(|| type_issue(path, "an object", value))
}

fn expect_array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, ValidationIssue> {
    value.as_array().ok_or_else(|| type_issue(path, "an array", value))
}

fn expect_string<'a>(value: &'a Value, path: &str) -> Result<&'a str, ValidationIssue> {
    value.as_str().ok_or_else(|| type_issue(path, "a string", value))
}

fn expect_non_empty_string<'a>(value: &'a Value, path: &str) -> Result<&'a str, ValidationIssue> {
    let text = expect_string(value, path)?;
    if text.trim().is_empty() {
        return Err(ValidationIssue::new(path, "must not be empty"));
    }
    Ok(text)
}

fn type_issue(path: &str, expected: &str, actual: &Value) -> ValidationIssue {
    ValidationIssue::new(path, format!("expected {expected}, found {}", json_type_name(actual)))
        .with_param("expected", expected)
        .with_param("actual", json_type_name(actual))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
