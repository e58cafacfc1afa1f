//! Configuration IO helpers for the broker.

use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use dirs_next::config_dir;
use prompthub_util::expand_tilde;
use tracing::debug;

use crate::config::{BrokerConfig, ConfigError, interpolate_config, validate_config};

pub const CONFIG_PATH_ENV: &str = "PROMPTHUB_CONFIG_PATH";

/// Returns the default path for the broker configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("prompthub").join("config.json")
}

/// Loads configuration from a specific path.
///
/// A missing file yields defaults. Environment overrides are applied after
/// `${env:NAME}` interpolation and before validation.
pub fn load_config_from_path(path: &Path) -> Result<BrokerConfig, ConfigError> {
    load_config_with(path, |_| {})
}

/// Like [`load_config_from_path`], with `adjust` applied after the environment
/// overrides and before validation. Command-line flags go through here.
pub fn load_config_with(path: &Path, adjust: impl FnOnce(&mut BrokerConfig)) -> Result<BrokerConfig, ConfigError> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        debug!(path = %path.display(), "no configuration file, using defaults");
        BrokerConfig::default()
    };

    interpolate_config(&mut config)?;
    apply_env_overrides(&mut config)?;
    adjust(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Applies `GITHUB_*` and `PROMPTHUB_*` variables over file settings.
pub fn apply_env_overrides(config: &mut BrokerConfig) -> Result<(), ConfigError> {
    if let Some(token) = env_value("GITHUB_TOKEN") {
        config.github.token = Some(token);
    }
    if let Some(owner) = env_value("GITHUB_OWNER") {
        config.github.owner = Some(owner);
    }
    if let Some(repo) = env_value("GITHUB_REPO") {
        config.github.repo = Some(repo);
    }
    if let Some(reference) = env_value("PROMPTHUB_DEFAULT_REF") {
        config.default_ref = reference;
    }
    if let Some(ttl) = parsed_env_value("PROMPTHUB_CACHE_TTL_MS")? {
        config.cache_ttl_ms = ttl;
    }
    if let Some(size) = parsed_env_value("PROMPTHUB_MAX_FILE_SIZE")? {
        config.max_file_size = size;
    }
    if let Some(root) = env_value("PROMPTHUB_LOCAL_ROOT") {
        config.local_root = Some(expand_tilde(&root));
    }
    Ok(())
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parsed_env_value<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_value(name)
        .map(|value| {
            value.parse::<T>().map_err(|error| ConfigError::InvalidOverride {
                name: name.to_string(),
                value: value.clone(),
                reason: error.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERRIDES: [&str; 7] = [
        "GITHUB_TOKEN",
        "GITHUB_OWNER",
        "GITHUB_REPO",
        "PROMPTHUB_DEFAULT_REF",
        "PROMPTHUB_CACHE_TTL_MS",
        "PROMPTHUB_MAX_FILE_SIZE",
        "PROMPTHUB_LOCAL_ROOT",
    ];

    fn without_overrides<R>(closure: impl FnOnce() -> R) -> R {
        temp_env::with_vars_unset(OVERRIDES, closure)
    }

    #[test]
    fn default_path_honors_environment_override() {
        let override_path = "~/custom/prompthub/config.json";
        temp_env::with_var(CONFIG_PATH_ENV, Some(override_path), || {
            assert_eq!(default_config_path(), expand_tilde(override_path));
        });
    }

    #[test]
    fn loads_file_then_applies_overrides() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(
            &path,
            r#"{ "github": { "owner": "acme", "repo": "prompts", "token": "${env:PROMPTHUB_TEST_PAT}" }, "cacheTtlMs": 1000 }"#,
        )
        .expect("write config");

        without_overrides(|| {
            temp_env::with_vars(
                [
                    ("PROMPTHUB_TEST_PAT", Some("ghp_file")),
                    ("GITHUB_REPO", Some("prompts-staging")),
                    ("PROMPTHUB_MAX_FILE_SIZE", Some("2048")),
                ],
                || {
                    let config = load_config_from_path(&path).expect("load config");
                    assert_eq!(config.github.owner.as_deref(), Some("acme"));
                    assert_eq!(config.github.repo.as_deref(), Some("prompts-staging"));
                    assert_eq!(config.github.token.as_deref(), Some("ghp_file"));
                    assert_eq!(config.cache_ttl_ms, 1000);
                    assert_eq!(config.max_file_size, 2048);
                },
            );
        });
    }

    #[test]
    fn missing_file_with_local_root_override_is_valid() {
        let temp = tempfile::tempdir().expect("tempdir");
        without_overrides(|| {
            temp_env::with_var("PROMPTHUB_LOCAL_ROOT", Some(temp.path().as_os_str()), || {
                let config = load_config_from_path(&temp.path().join("absent.json")).expect("defaults");
                assert_eq!(config.local_root.as_deref(), Some(temp.path()));
                assert_eq!(config.default_ref, "main");
            });
        });
    }

    #[test]
    fn missing_file_without_repository_fails_validation() {
        let temp = tempfile::tempdir().expect("tempdir");
        without_overrides(|| {
            let error = load_config_from_path(&temp.path().join("absent.json")).expect_err("owner required");
            assert!(matches!(error, ConfigError::Validation(_)));
        });
    }

    #[test]
    fn adjustments_apply_before_validation() {
        let temp = tempfile::tempdir().expect("tempdir");
        without_overrides(|| {
            let config = load_config_with(&temp.path().join("absent.json"), |config| {
                config.local_root = Some(temp.path().to_path_buf());
            })
            .expect("local root satisfies validation");
            assert!(config.uses_local_source());
        });
    }

    #[test]
    fn malformed_numeric_override_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        without_overrides(|| {
            temp_env::with_vars(
                [
                    ("PROMPTHUB_LOCAL_ROOT", Some("/srv/prompts")),
                    ("PROMPTHUB_CACHE_TTL_MS", Some("soon")),
                ],
                || {
                    let error = load_config_from_path(&temp.path().join("absent.json")).expect_err("bad ttl");
                    assert!(matches!(error, ConfigError::InvalidOverride { name, .. } if name == "PROMPTHUB_CACHE_TTL_MS"));
                },
            );
        });
    }
}
