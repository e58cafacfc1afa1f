//! Document sources for the prompthub engine.
//!
//! - [`GithubSource`] reads templates and flows through the GitHub contents API
//!   with conditional requests, size limits, and retries for transient failures.
//! - [`LocalSource`] serves the same layout from a local directory.
//!
//! Both implement [`prompthub_engine::DocumentSource`].

pub mod error;
pub mod github;
pub mod local;
pub mod retry;

pub use error::SourceError;
pub use github::{DEFAULT_GITHUB_API_BASE, GithubSource, GithubSourceConfig};
pub use local::LocalSource;
pub use retry::RetryPolicy;
