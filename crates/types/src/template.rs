//! Template document shapes and the canonical template record.
//!
//! The repository holds templates written by several generations of tooling.
//! [`TemplateDocument`] enumerates the accepted shapes; the engine normalises
//! every shape into a [`Template`] before rendering.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Variable bindings passed to template rendering, in insertion order.
pub type VariableMap = IndexMap<String, Value>;

/// Canonical template consumed by the renderer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub title: String,
    /// Text containing `{name}` placeholders.
    pub body: String,
    /// Declared variable names.
    #[serde(default)]
    pub variables: Vec<String>,
    /// Named bundles of pre-filled values.
    #[serde(default)]
    pub variable_value_sets: Vec<VariableValueSet>,
}

impl Template {
    pub fn value_set(&self, name: &str) -> Option<&VariableValueSet> {
        self.variable_value_sets.iter().find(|set| set.name == name)
    }
}

/// Named bundle of variable values selectable at render time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VariableValueSet {
    pub name: String,
    #[serde(default)]
    pub values: VariableMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Accepted template document shapes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TemplateDocument {
    /// `{ "templates": [ ... ] }`; the first entry is used.
    Wrapped(WrappedTemplates),
    /// `{ "title": ..., "template": ..., "variables": [...] }`.
    Direct(DirectTemplate),
    /// `{ "metadata": ..., "results" | "content": ..., "variables": [...] }`.
    Legacy(LegacyTemplate),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WrappedTemplates {
    pub templates: Vec<DirectTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectTemplate {
    #[serde(default)]
    pub title: Option<String>,
    pub template: String,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    #[serde(default)]
    pub variable_value_sets: Vec<VariableValueSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyTemplate {
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

/// Declared template variable: a bare name or a described object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TemplateVariable {
    Name(String),
    Described {
        #[serde(alias = "key")]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl TemplateVariable {
    pub fn name(&self) -> &str {
        match self {
            TemplateVariable::Name(name) => name,
            TemplateVariable::Described { name, .. } => name,
        }
    }
}
