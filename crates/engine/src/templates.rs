//! Template normalisation and rendering.
//!
//! Templates arrive in one of three document shapes (see
//! [`prompthub_types::TemplateDocument`]). [`normalize_template`] turns any of
//! them into a canonical [`Template`]; [`render_template`] applies variable-set
//! selection and substitutes `{name}` placeholders.
//!
//! Substitution is a single pass: replacement text is never scanned again, and
//! placeholders without a binding stay in the output verbatim.

use once_cell::sync::Lazy;
use prompthub_types::{DirectTemplate, LegacyTemplate, Template, TemplateVariable, VariableMap, WrappedTemplates};
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{FlowError, SOURCE_TEMPLATE_RENDER};

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder regex should compile"));

/// Caller variable naming the value set to apply.
pub const VARIABLE_SET_SELECTOR: &str = "_variableSet";
/// Prefix of boolean-style value set selectors (`_useSet_<Name>`).
pub const USE_SET_PREFIX: &str = "_useSet_";

/// Rendered template text plus the bindings that produced it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderedTemplate {
    pub title: String,
    pub output: String,
    /// Effective variables after value-set merging and selector stripping.
    pub variables: VariableMap,
}

/// Converts any accepted template document shape into a [`Template`].
pub fn normalize_template(document: &Value) -> Result<Template, FlowError> {
    let Some(object) = document.as_object() else {
        return Err(FlowError::parse(SOURCE_TEMPLATE_RENDER, "template document must be a JSON object"));
    };

    if object.contains_key("templates") {
        let wrapped: WrappedTemplates = deserialize_shape(document, "wrapped")?;
        let first = wrapped
            .templates
            .into_iter()
            .next()
            .ok_or_else(|| FlowError::parse(SOURCE_TEMPLATE_RENDER, "template document contains an empty \"templates\" list"))?;
        return Ok(from_direct(first));
    }

    if object.contains_key("template") {
        return deserialize_shape::<DirectTemplate>(document, "direct").map(from_direct);
    }

    if object.contains_key("metadata") && (object.contains_key("results") || object.contains_key("content")) {
        return deserialize_shape::<LegacyTemplate>(document, "legacy").map(from_legacy);
    }

    Err(FlowError::parse(
        SOURCE_TEMPLATE_RENDER,
        "unrecognised template document; expected \"templates\", \"template\", or \"metadata\" with \"results\"/\"content\"",
    ))
}

fn deserialize_shape<T: serde::de::DeserializeOwned>(document: &Value, shape: &str) -> Result<T, FlowError> {
    serde_json::from_value(document.clone())
        .map_err(|error| FlowError::parse(SOURCE_TEMPLATE_RENDER, format!("invalid {shape} template document: {error}")))
}

fn from_direct(direct: DirectTemplate) -> Template {
    Template {
        title: direct.title.unwrap_or_default(),
        body: direct.template,
        variables: variable_names(&direct.variables),
        variable_value_sets: direct.variable_value_sets,
    }
}

fn from_legacy(legacy: LegacyTemplate) -> Template {
    let title = ["title", "name"]
        .iter()
        .find_map(|field| legacy.metadata.get(*field).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let body = match (&legacy.results, &legacy.content) {
        (Some(Value::Array(results)), _) => results.iter().map(value_to_text).collect::<Vec<_>>().join("\n"),
        (Some(results), None) => value_to_text(results),
        (_, Some(content)) => value_to_text(content),
        (None, None) => String::new(),
    };

    Template {
        title,
        body,
        variables: variable_names(&legacy.variables),
        variable_value_sets: Vec::new(),
    }
}

fn variable_names(variables: &[TemplateVariable]) -> Vec<String> {
    variables.iter().map(|variable| variable.name().to_string()).collect()
}

/// Unique placeholder names in order of first appearance.
pub fn extract_placeholders(body: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for captures in PLACEHOLDER_REGEX.captures_iter(body) {
        let name = &captures[1];
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Renders a template with the given variables.
pub fn render_template(template: &Template, variables: &VariableMap) -> RenderedTemplate {
    let effective = apply_variable_set(template, variables);
    RenderedTemplate {
        title: template.title.clone(),
        output: substitute_placeholders(&template.body, &effective),
        variables: effective,
    }
}

/// Merges the selected value set under the caller's variables and strips selector keys.
///
/// `_variableSet` takes precedence over `_useSet_<Name>` selectors; among the
/// latter, the first truthy selector naming an existing set wins.
pub fn apply_variable_set(template: &Template, variables: &VariableMap) -> VariableMap {
    let selected = variables
        .get(VARIABLE_SET_SELECTOR)
        .filter(|value| is_truthy(value))
        .map(|value| value_to_text(value).trim().to_string())
        .into_iter()
        .chain(
            variables
                .iter()
                .filter_map(|(key, value)| key.strip_prefix(USE_SET_PREFIX).filter(|_| is_truthy(value)).map(str::to_string)),
        )
        .find_map(|name| template.value_set(&name));

    let mut effective = VariableMap::new();
    if let Some(value_set) = selected {
        debug!(value_set = %value_set.name, "applying template value set");
        effective.extend(value_set.values.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    for (key, value) in variables {
        if is_selector(key) {
            continue;
        }
        effective.insert(key.clone(), value.clone());
    }
    effective
}

fn is_selector(key: &str) -> bool {
    key == VARIABLE_SET_SELECTOR || key.starts_with(USE_SET_PREFIX)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        other => !value_to_text(other).trim().is_empty(),
    }
}

/// Replaces every bound `{name}` placeholder in one pass.
pub fn substitute_placeholders(body: &str, variables: &VariableMap) -> String {
    PLACEHOLDER_REGEX
        .replace_all(body, |captures: &Captures| match variables.get(&captures[1]) {
            Some(value) => value_to_text(value),
            None => captures[0].to_string(),
        })
        .into_owned()
}

/// Text form of a JSON value: strings verbatim, everything else as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
