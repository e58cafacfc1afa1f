//! Data models for broker configuration.

use std::{path::PathBuf, time::Duration};

use prompthub_engine::{
    EngineConfig,
    config::{DEFAULT_CACHE_TTL, DEFAULT_MAX_FILE_SIZE, DEFAULT_REF},
};
use prompthub_source::DEFAULT_GITHUB_API_BASE;
use prompthub_types::DocumentKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{interpolation::InterpolationError, validation::ValidationError};

/// Broker configuration loaded from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BrokerConfig {
    /// Remote repository settings.
    #[serde(default)]
    pub github: GithubSettings,
    /// Serve documents from this directory instead of GitHub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,
    /// Lifetime of cached documents, in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Largest accepted document, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Git ref used when a request does not name one.
    #[serde(default = "default_ref")]
    pub default_ref: String,
    #[serde(default)]
    pub http_server: HttpServerSettings,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            github: GithubSettings::default(),
            local_root: None,
            cache_ttl_ms: default_cache_ttl_ms(),
            max_file_size: default_max_file_size(),
            default_ref: default_ref(),
            http_server: HttpServerSettings::default(),
        }
    }
}

impl BrokerConfig {
    /// Settings handed to the engine.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache_ttl: Duration::from_millis(self.cache_ttl_ms),
            max_file_size: self.max_file_size,
            default_ref: self.default_ref.clone(),
        }
    }

    pub fn uses_local_source(&self) -> bool {
        self.local_root.is_some()
    }
}

/// GitHub repository coordinates and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GithubSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    /// Personal access token; usually `${env:GITHUB_TOKEN}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_template_dir")]
    pub template_dir: String,
    #[serde(default = "default_flow_dir")]
    pub flow_dir: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per request, including the first, for transient failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            owner: None,
            repo: None,
            token: None,
            template_dir: default_template_dir(),
            flow_dir: default_flow_dir(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Streamable HTTP hosting settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpServerSettings {
    /// Loopback address to bind, for example `127.0.0.1:62890`.
    pub bind_address: String,
}

impl Default for HttpServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:62890".to_string(),
        }
    }
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL.as_millis() as u64
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_ref() -> String {
    DEFAULT_REF.to_string()
}

fn default_api_base() -> String {
    DEFAULT_GITHUB_API_BASE.to_string()
}

fn default_template_dir() -> String {
    DocumentKind::Template.default_directory().to_string()
}

fn default_flow_dir() -> String {
    DocumentKind::Flow.default_directory().to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("environment override {name}={value} is not valid: {reason}")]
    InvalidOverride { name: String, value: String, reason: String },

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: BrokerConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config, BrokerConfig::default());
        assert_eq!(config.engine_config(), EngineConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = serde_json::from_str::<BrokerConfig>(r#"{ "cacheTtl": 5 }"#).expect_err("unknown field");
        assert!(error.to_string().contains("cacheTtl"));
    }
}
