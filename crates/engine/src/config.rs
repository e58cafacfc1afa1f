//! Settings injected into the engine at construction time.

use std::time::Duration;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(300_000);
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_REF: &str = "main";

/// Engine configuration. The engine never reads the environment itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Lifetime of a memoised document.
    pub cache_ttl: Duration,
    /// Largest accepted document, in bytes.
    pub max_file_size: u64,
    /// Git ref used when the caller does not name one.
    pub default_ref: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            default_ref: DEFAULT_REF.to_string(),
        }
    }
}

impl EngineConfig {
    /// Returns `reference` when it is non-blank, else the configured default.
    pub fn resolve_ref<'a>(&'a self, reference: Option<&'a str>) -> &'a str {
        reference
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .unwrap_or(&self.default_ref)
    }
}
