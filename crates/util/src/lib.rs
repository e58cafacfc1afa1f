pub mod names;
pub mod path_processing;
pub mod redaction;

pub use names::{MAX_RESOURCE_NAME_LENGTH, ResourceNameError, validate_repository_coordinate, validate_resource_name};
pub use path_processing::expand_tilde;
pub use redaction::redact_sensitive;
