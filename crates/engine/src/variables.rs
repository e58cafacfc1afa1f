//! Per-node variable resolution.
//!
//! Sources, lowest priority first:
//!
//! 1. multi-input node declarations (`name` contributes `""`, `{key, value}` contributes `value`),
//! 2. caller-supplied initial variables,
//! 3. outputs of completed upstream nodes, exposed as `{id}_result` and `{id}_template`
//!    with every `-` removed from the node id.
//!
//! An initial variable that collides with a synthesised upstream key keeps its
//! caller-supplied value.

use prompthub_types::{ExecutionResult, Flow, NodeKind, VariableMap};
use serde_json::Value;

/// Suffix of the key holding an upstream node's rendered output.
pub const RESULT_SUFFIX: &str = "_result";
/// Suffix of the key holding an upstream node's template name.
pub const TEMPLATE_SUFFIX: &str = "_template";

/// Merges every multi-input node's declarations in declared order.
pub fn multi_input_contributions(flow: &Flow) -> VariableMap {
    let mut contributions = VariableMap::new();
    for node in flow.nodes.iter().filter(|node| node.kind == NodeKind::MultiInput) {
        for variable in &node.data.variables {
            contributions.insert(variable.name().to_string(), variable.default_value());
        }
    }
    contributions
}

/// Layers the caller's initial variables over multi-input contributions.
pub fn base_variables(contributions: &VariableMap, initial_variables: &VariableMap) -> VariableMap {
    let mut base = contributions.clone();
    for (key, value) in initial_variables {
        base.insert(key.clone(), value.clone());
    }
    base
}

/// Key prefix used for a node's upstream outputs.
pub fn upstream_key(node_id: &str) -> String {
    node_id.replace('-', "")
}

/// Resolves the variables handed to the next node.
///
/// `base` is the result of [`base_variables`]; `completed` holds every result
/// produced so far, in execution order.
pub fn resolve_node_variables(base: &VariableMap, initial_variables: &VariableMap, completed: &[ExecutionResult]) -> VariableMap {
    let mut resolved = base.clone();
    for result in completed {
        let prefix = upstream_key(&result.node_id);
        let synthesised = [
            (format!("{prefix}{RESULT_SUFFIX}"), Value::String(result.output.clone())),
            (format!("{prefix}{TEMPLATE_SUFFIX}"), Value::String(result.template_name.clone())),
        ];
        for (key, value) in synthesised {
            if !initial_variables.contains_key(&key) {
                resolved.insert(key, value);
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completed(node_id: &str, template_name: &str, output: &str) -> ExecutionResult {
        ExecutionResult {
            node_id: node_id.into(),
            template_name: template_name.into(),
            input_variables: VariableMap::new(),
            output: output.into(),
            execution_time_ms: 0,
        }
    }

    #[test]
    fn multi_input_pairs_and_names_contribute_defaults() {
        let flow: Flow = serde_json::from_value(json!({
            "id": "f", "name": "F", "version": "1.0.0",
            "nodes": [
                { "id": "in", "type": "multi_input", "data": { "variables": ["topic", { "key": "tone", "value": "dry" }] } },
                { "id": "t", "type": "template", "data": { "selectedTemplateId": "T", "variables": ["topic"] } }
            ],
            "edges": []
        }))
        .expect("flow");

        let contributions = multi_input_contributions(&flow);
        assert_eq!(contributions.get("topic"), Some(&json!("")));
        assert_eq!(contributions.get("tone"), Some(&json!("dry")));
    }

    #[test]
    fn initial_variables_override_multi_input_contributions() {
        let contributions = VariableMap::from([("topic".to_string(), json!("")), ("tone".to_string(), json!("dry"))]);
        let initial = VariableMap::from([("topic".to_string(), json!("rust"))]);

        let base = base_variables(&contributions, &initial);
        assert_eq!(base.get("topic"), Some(&json!("rust")));
        assert_eq!(base.get("tone"), Some(&json!("dry")));
    }

    #[test]
    fn upstream_outputs_use_dash_free_keys() {
        let base = VariableMap::new();
        let results = [completed("node-1", "Topic_Analysis", "ANALYSIS")];

        let resolved = resolve_node_variables(&base, &VariableMap::new(), &results);
        assert_eq!(resolved.get("node1_result"), Some(&json!("ANALYSIS")));
        assert_eq!(resolved.get("node1_template"), Some(&json!("Topic_Analysis")));
    }

    #[test]
    fn upstream_outputs_beat_multi_input_but_not_initial_variables() {
        let contributions = VariableMap::from([("a_result".to_string(), json!("placeholder")), ("b_result".to_string(), json!(""))]);
        let initial = VariableMap::from([("b_result".to_string(), json!("pinned"))]);
        let base = base_variables(&contributions, &initial);
        let results = [completed("a", "T", "from-a"), completed("b", "T", "from-b")];

        let resolved = resolve_node_variables(&base, &initial, &results);
        assert_eq!(resolved.get("a_result"), Some(&json!("from-a")));
        assert_eq!(resolved.get("b_result"), Some(&json!("pinned")));
    }
}
