//! Builds the engine stack described by a [`BrokerConfig`].

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use prompthub_engine::{DocumentSource, DocumentStore, FlowExecutor};
use prompthub_source::{GithubSource, GithubSourceConfig, LocalSource, RetryPolicy};
use tracing::info;

use crate::config::BrokerConfig;

/// Creates the document source selected by `config`.
pub fn build_source(config: &BrokerConfig) -> Result<Arc<dyn DocumentSource>> {
    let github = &config.github;
    if let Some(root) = &config.local_root {
        info!(root = %root.display(), "using local document source");
        let source = LocalSource::new(root, config.max_file_size).with_directories(&github.template_dir, &github.flow_dir);
        return Ok(Arc::new(source));
    }

    let (Some(owner), Some(repo)) = (github.owner.as_deref(), github.repo.as_deref()) else {
        anyhow::bail!("github.owner and github.repo are required when no local root is configured");
    };
    let source_config = GithubSourceConfig {
        api_base: github.api_base.clone(),
        token: github.token.clone(),
        template_dir: github.template_dir.clone(),
        flow_dir: github.flow_dir.clone(),
        max_file_size: config.max_file_size,
        timeout: Duration::from_secs(github.timeout_secs),
        retry: RetryPolicy {
            max_attempts: github.max_attempts,
            ..RetryPolicy::default()
        },
        ..GithubSourceConfig::new(owner, repo)
    };
    let source = GithubSource::new(source_config).with_context(|| format!("failed to configure GitHub source for {owner}/{repo}"))?;
    info!(owner = %owner, repo = %repo, authenticated = github.token.is_some(), "using GitHub document source");
    Ok(Arc::new(source))
}

/// Creates an executor over a caching store for the configured source.
pub fn build_executor(config: &BrokerConfig) -> Result<Arc<FlowExecutor>> {
    let engine_config = config.engine_config();
    let store = DocumentStore::new(build_source(config)?, &engine_config);
    Ok(Arc::new(FlowExecutor::new(Arc::new(store), engine_config)))
}
