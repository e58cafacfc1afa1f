//! Configuration validation for the broker.

use std::net::SocketAddr;

use prompthub_util::validate_resource_name;
use thiserror::Error;
use tracing::debug;

use crate::config::BrokerConfig;

/// Validate the entire broker configuration.
pub fn validate_config(config: &BrokerConfig) -> Result<(), ValidationError> {
    if !config.uses_local_source() {
        validate_repository_coordinate("github.owner", config.github.owner.as_deref())?;
        validate_repository_coordinate("github.repo", config.github.repo.as_deref())?;
    }

    validate_directory("github.templateDir", &config.github.template_dir)?;
    validate_directory("github.flowDir", &config.github.flow_dir)?;

    if config.default_ref.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "defaultRef".to_string(),
            reason: "Default ref cannot be empty".to_string(),
        });
    }
    if config.max_file_size == 0 {
        return Err(ValidationError::InvalidField {
            field: "maxFileSize".to_string(),
            reason: "Maximum file size must be greater than zero".to_string(),
        });
    }
    if config.github.timeout_secs == 0 {
        return Err(ValidationError::InvalidField {
            field: "github.timeoutSecs".to_string(),
            reason: "Timeout must be greater than zero".to_string(),
        });
    }
    if config.github.max_attempts == 0 {
        return Err(ValidationError::InvalidField {
            field: "github.maxAttempts".to_string(),
            reason: "At least one attempt is required".to_string(),
        });
    }
    config
        .http_server
        .bind_address
        .parse::<SocketAddr>()
        .map_err(|error| ValidationError::InvalidField {
            field: "httpServer.bindAddress".to_string(),
            reason: error.to_string(),
        })?;

    debug!(local = config.uses_local_source(), "validated broker configuration");
    Ok(())
}

fn validate_repository_coordinate(field: &str, value: Option<&str>) -> Result<(), ValidationError> {
    let Some(value) = value.filter(|value| !value.trim().is_empty()) else {
        return Err(ValidationError::MissingRequiredField {
            field: field.to_string(),
            reason: "required unless localRoot is set".to_string(),
        });
    };
    prompthub_util::validate_repository_coordinate(value).map_err(|error| ValidationError::InvalidField {
        field: field.to_string(),
        reason: error.to_string(),
    })?;
    Ok(())
}

/// Directories are relative to the repository root and may not climb out of it.
fn validate_directory(field: &str, value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim_matches('/');
    let valid = !trimmed.is_empty()
        && trimmed
            .split('/')
            .all(|segment| segment == segment.trim() && validate_resource_name(segment).is_ok());
    if !valid {
        return Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: format!("'{value}' is not a relative repository directory"),
        });
    }
    Ok(())
}

/// Validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field '{field}': {reason}")]
    MissingRequiredField { field: String, reason: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github_config() -> BrokerConfig {
        let mut config = BrokerConfig::default();
        config.github.owner = Some("acme".into());
        config.github.repo = Some("prompts".into());
        config
    }

    #[test]
    fn accepts_complete_github_config() {
        assert_eq!(validate_config(&github_config()), Ok(()));
    }

    #[test]
    fn repository_is_optional_with_local_root() {
        let config = BrokerConfig {
            local_root: Some("/srv/prompts".into()),
            ..BrokerConfig::default()
        };
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn dotted_repository_names_are_valid() {
        let mut config = github_config();
        config.github.repo = Some("prompts.github.io".into());
        assert_eq!(validate_config(&config), Ok(()));

        config.github.owner = Some("..".into());
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::InvalidField { field, .. }) if field == "github.owner"
        ));
    }

    #[test]
    fn missing_owner_is_reported() {
        let mut config = github_config();
        config.github.owner = None;
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::MissingRequiredField { field, .. }) if field == "github.owner"
        ));
    }

    #[test]
    fn rejects_traversal_in_directories() {
        let mut config = github_config();
        config.github.flow_dir = "../flows".into();
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::InvalidField { field, .. }) if field == "github.flowDir"
        ));

        config.github.flow_dir = "prompts/flows".into();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn rejects_zero_limits_and_bad_bind_address() {
        let mut config = github_config();
        config.max_file_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = github_config();
        config.http_server.bind_address = "localhost".into();
        assert!(validate_config(&config).is_err());
    }
}
