use prompthub_types::VariableMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for the listing tools.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ListRequest {
    /// Git ref to list from.
    #[serde(default, rename = "ref")]
    #[schemars(description = "Branch, tag, or commit to read from. Defaults to the configured ref.")]
    pub reference: Option<String>,
}

/// Parameters for fetching and rendering one template.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GetTemplateRequest {
    #[schemars(description = "Template name as returned by list_templates, without the .json extension.")]
    pub name: String,
    /// Values substituted into `{placeholder}` tokens.
    #[serde(default)]
    #[schemars(
        description = "Placeholder values. `_variableSet` or a truthy `_useSet_<name>` selects a predefined value set; explicit values win over set values."
    )]
    pub variables: Option<VariableMap>,
    #[serde(default, rename = "ref")]
    #[schemars(description = "Branch, tag, or commit to read from. Defaults to the configured ref.")]
    pub reference: Option<String>,
}

/// Parameters for flow validation. Exactly one of `name` and `flow` is required.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ValidateFlowRequest {
    #[serde(default)]
    #[schemars(description = "Name of a stored flow document, as returned by list_flows.")]
    pub name: Option<String>,
    #[serde(default)]
    #[schemars(description = "Inline flow document ({ metadata, flows }) to validate instead of a stored one.")]
    pub flow: Option<Value>,
    #[serde(default, rename = "ref")]
    #[schemars(description = "Branch, tag, or commit to read a named flow from.")]
    pub reference: Option<String>,
}

/// Parameters for flow execution. Exactly one of `name` and `flow` is required.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ExecuteFlowRequest {
    #[serde(default)]
    #[schemars(description = "Name of a stored flow document, as returned by list_flows.")]
    pub name: Option<String>,
    #[serde(default)]
    #[schemars(description = "Inline flow document ({ metadata, flows }) to execute instead of a stored one.")]
    pub flow: Option<Value>,
    /// Initial variables; they take precedence over upstream node outputs.
    #[serde(default)]
    #[schemars(description = "Initial variables visible to every template node. They override upstream results with the same name.")]
    pub variables: Option<VariableMap>,
    #[serde(default, rename = "ref")]
    #[schemars(description = "Branch, tag, or commit used for the flow and every template it references.")]
    pub reference: Option<String>,
}
