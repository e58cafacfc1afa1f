//! `${env:NAME}` interpolation for configuration strings.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;
use tracing::debug;

use crate::config::BrokerConfig;

static ENV_PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{env:([A-Za-z0-9_]+)\}").expect("env placeholder regex should compile"));

/// Errors that can occur during interpolation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("Missing environment variable: {name}")]
    MissingEnvVar { name: String },
}

/// Interpolate environment variables in every string setting.
pub fn interpolate_config(config: &mut BrokerConfig) -> Result<(), InterpolationError> {
    let github = &mut config.github;
    github.api_base = interpolate_string(&github.api_base)?;
    github.template_dir = interpolate_string(&github.template_dir)?;
    github.flow_dir = interpolate_string(&github.flow_dir)?;
    for value in [&mut github.owner, &mut github.repo, &mut github.token].into_iter().flatten() {
        *value = interpolate_string(value)?;
    }

    if let Some(root) = config.local_root.as_mut()
        && let Some(raw) = root.to_str()
    {
        *root = interpolate_string(raw)?.into();
    }
    config.default_ref = interpolate_string(&config.default_ref)?;
    config.http_server.bind_address = interpolate_string(&config.http_server.bind_address)?;
    Ok(())
}

/// Replaces each `${env:NAME}` with the variable's value.
pub fn interpolate_string(value: &str) -> Result<String, InterpolationError> {
    let mut missing = None;
    let resolved = ENV_PLACEHOLDER_REGEX.replace_all(value, |captures: &Captures| {
        let name = &captures[1];
        match std::env::var(name) {
            Ok(resolved) => {
                debug!("Interpolated env var: {} -> [REDACTED]", name);
                resolved
            }
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(InterpolationError::MissingEnvVar { name }),
        None => Ok(resolved.into_owned()),
    }
}
