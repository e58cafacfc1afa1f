//! Broker configuration.
//! This module handles parsing, interpolation, environment overrides, and
//! validation of the ~/.config/prompthub/config.json file.

mod interpolation;
mod io;
mod model;
mod validation;

pub use interpolation::{InterpolationError, interpolate_config};
pub use io::{CONFIG_PATH_ENV, apply_env_overrides, default_config_path, load_config_from_path, load_config_with};
pub use model::{BrokerConfig, ConfigError, GithubSettings, HttpServerSettings};
pub use validation::{ValidationError, validate_config};
