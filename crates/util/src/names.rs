//! Resource name sanitising.
//!
//! Template and flow names become repository paths, so they are restricted to
//! a conservative character set before any lookup happens.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const MAX_RESOURCE_NAME_LENGTH: usize = 255;

static RESOURCE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("resource name regex should compile"));
static COORDINATE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("coordinate regex should compile"));

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceNameError {
    #[error("name must not be empty")]
    Empty,

    #[error("name '{name}' exceeds {MAX_RESOURCE_NAME_LENGTH} characters")]
    TooLong { name: String },

    #[error("name '{name}' may only contain letters, digits, '_' and '-'")]
    InvalidCharacters { name: String },

    #[error("'{name}' is not a valid repository owner or name")]
    InvalidCoordinate { name: String },
}

/// Validates a template or flow name and returns it trimmed.
pub fn validate_resource_name(name: &str) -> Result<&str, ResourceNameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ResourceNameError::Empty);
    }
    if trimmed.chars().count() > MAX_RESOURCE_NAME_LENGTH {
        return Err(ResourceNameError::TooLong { name: trimmed.to_string() });
    }
    if !RESOURCE_NAME_REGEX.is_match(trimmed) {
        return Err(ResourceNameError::InvalidCharacters { name: trimmed.to_string() });
    }
    Ok(trimmed)
}

/// Validates a GitHub owner or repository name and returns it trimmed.
///
/// Dots are allowed (`prompts.github.io`); `.` and `..` are not, since the
/// value becomes a URL path segment.
pub fn validate_repository_coordinate(name: &str) -> Result<&str, ResourceNameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ResourceNameError::Empty);
    }
    if trimmed.chars().count() > MAX_RESOURCE_NAME_LENGTH {
        return Err(ResourceNameError::TooLong { name: trimmed.to_string() });
    }
    if matches!(trimmed, "." | "..") || !COORDINATE_REGEX.is_match(trimmed) {
        return Err(ResourceNameError::InvalidCoordinate { name: trimmed.to_string() });
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_repository_style_names() {
        assert_eq!(validate_resource_name("Topic_Analysis"), Ok("Topic_Analysis"));
        assert_eq!(validate_resource_name(" daily-summary "), Ok("daily-summary"));
    }

    #[test]
    fn rejects_path_traversal_and_empty_names() {
        assert_eq!(validate_resource_name("   "), Err(ResourceNameError::Empty));
        assert!(matches!(
            validate_resource_name("../secrets"),
            Err(ResourceNameError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            validate_resource_name("a/b"),
            Err(ResourceNameError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn rejects_names_over_the_length_limit() {
        let long_name = "a".repeat(MAX_RESOURCE_NAME_LENGTH + 1);
        assert!(matches!(validate_resource_name(&long_name), Err(ResourceNameError::TooLong { .. })));
        assert!(validate_resource_name(&"a".repeat(MAX_RESOURCE_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn repository_coordinates_allow_dots() {
        assert_eq!(validate_repository_coordinate("prompts.github.io"), Ok("prompts.github.io"));
        assert_eq!(validate_repository_coordinate("acme-labs"), Ok("acme-labs"));
        assert!(validate_resource_name("prompts.github.io").is_err());
    }

    #[test]
    fn repository_coordinates_reject_traversal() {
        for name in [".", "..", "acme/prompts", "a b"] {
            assert!(
                matches!(validate_repository_coordinate(name), Err(ResourceNameError::InvalidCoordinate { .. })),
                "{name}"
            );
        }
        assert_eq!(validate_repository_coordinate(""), Err(ResourceNameError::Empty));
        let long_name = "a".repeat(MAX_RESOURCE_NAME_LENGTH + 1);
        assert!(matches!(validate_repository_coordinate(&long_name), Err(ResourceNameError::TooLong { .. })));
    }
}
