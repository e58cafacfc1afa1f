//! Document fetching with a TTL cache and single-flight coalescing.
//!
//! [`DocumentStore`] sits between the executor and a [`DocumentSource`]. A hit
//! within the TTL returns the memoised document. Concurrent misses for the same
//! key share one outbound fetch and all observe the same value or error. An
//! expired entry keeps its version token so the source can answer "not
//! modified", which refreshes the entry without a new download. Entries older
//! than [`EXPIRED_ENTRY_RETENTION`] times the TTL are dropped whenever a new
//! document is stored.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use prompthub_types::DocumentKind;
use prompthub_util::validate_resource_name;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::EngineConfig,
    error::{FlowError, SOURCE_DOCUMENT_STORE},
};

/// Result of a conditional document fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched {
        document: Value,
        /// Opaque version token (ETag, modification time) for later conditional fetches.
        version: Option<String>,
    },
    /// The caller's version token is still current.
    NotModified,
}

/// Backend that loads parsed documents from a repository.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetches `{kind}/{name}` at `reference`.
    ///
    /// When `known_version` is given and still current the source may answer
    /// [`FetchOutcome::NotModified`].
    async fn fetch_document(
        &self,
        kind: DocumentKind,
        name: &str,
        reference: &str,
        known_version: Option<&str>,
    ) -> Result<FetchOutcome, FlowError>;

    /// Lists document names of `kind` at `reference`, sorted.
    async fn list_documents(&self, kind: DocumentKind, reference: &str) -> Result<Vec<String>, FlowError>;
}

/// Expired entries are kept for revalidation up to this many TTLs.
pub const EXPIRED_ENTRY_RETENTION: u32 = 8;

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Value>, FlowError>>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: Instant,
    document: Arc<Value>,
    version: Option<String>,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, SharedFetch>,
}

/// Process-wide document cache in front of a [`DocumentSource`].
#[derive(Clone)]
pub struct DocumentStore {
    source: Arc<dyn DocumentSource>,
    cache_time_to_live: Duration,
    state: Arc<Mutex<StoreState>>,
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("DocumentStore")
            .field("cache_time_to_live", &self.cache_time_to_live)
            .field("cached_entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache key for a document: `"{kind}:{name}:{ref}"`.
pub fn cache_key(kind: DocumentKind, name: &str, reference: &str) -> String {
    format!("{}:{}:{}", kind.as_str(), name, reference)
}

impl DocumentStore {
    pub fn new(source: Arc<dyn DocumentSource>, config: &EngineConfig) -> Self {
        Self::with_time_to_live(source, config.cache_ttl)
    }

    pub fn with_time_to_live(source: Arc<dyn DocumentSource>, cache_time_to_live: Duration) -> Self {
        Self {
            source,
            cache_time_to_live,
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    /// Returns the parsed document, fetching it at most once per concurrent miss group.
    pub async fn get_document(&self, kind: DocumentKind, name: &str, reference: &str) -> Result<Arc<Value>, FlowError> {
        let name = validate_resource_name(name)?;
        let key = cache_key(kind, name, reference);

        let pending = {
            let mut state = lock(&self.state);
            if let Some(entry) = state.entries.get(&key)
                && entry.fetched_at.elapsed() < self.cache_time_to_live
            {
                debug!(cache_key = %key, "document cache hit");
                return Ok(entry.document.clone());
            }

            match state.in_flight.get(&key) {
                Some(pending) => {
                    debug!(cache_key = %key, "joining in-flight document fetch");
                    pending.clone()
                }
                None => {
                    debug!(cache_key = %key, "document cache miss");
                    let known_version = state.entries.get(&key).and_then(|entry| entry.version.clone());
                    let pending = self.start_fetch(kind, name.to_string(), reference.to_string(), key.clone(), known_version);
                    state.in_flight.insert(key.clone(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Lists document names straight from the source.
    pub async fn list_documents(&self, kind: DocumentKind, reference: &str) -> Result<Vec<String>, FlowError> {
        self.source.list_documents(kind, reference).await
    }

    /// Drops every memoised document.
    pub fn clear(&self) {
        lock(&self.state).entries.clear();
    }

    fn start_fetch(&self, kind: DocumentKind, name: String, reference: String, key: String, known_version: Option<String>) -> SharedFetch {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let retention = self.cache_time_to_live.saturating_mul(EXPIRED_ENTRY_RETENTION);

        async move {
            let outcome = source.fetch_document(kind, &name, &reference, known_version.as_deref()).await;

            let mut state = lock(&state);
            state.in_flight.remove(&key);
            match outcome {
                Ok(FetchOutcome::Fetched { document, version }) => {
                    info!(cache_key = %key, "document fetched");
                    let document = Arc::new(document);
                    let before = state.entries.len();
                    state.entries.retain(|_, entry| entry.fetched_at.elapsed() < retention);
                    if state.entries.len() < before {
                        debug!(evicted = before - state.entries.len(), "evicted stale document cache entries");
                    }
                    state.entries.insert(
                        key,
                        CacheEntry {
                            fetched_at: Instant::now(),
                            document: Arc::clone(&document),
                            version,
                        },
                    );
                    Ok(document)
                }
                Ok(FetchOutcome::NotModified) => match state.entries.get_mut(&key) {
                    Some(entry) => {
                        debug!(cache_key = %key, "document not modified; refreshing cache entry");
                        entry.fetched_at = Instant::now();
                        Ok(Arc::clone(&entry.document))
                    }
                    None => Err(FlowError::internal(
                        SOURCE_DOCUMENT_STORE,
                        format!("source reported '{key}' as not modified but no cached copy exists"),
                    )),
                },
                Err(error) => {
                    warn!(cache_key = %key, code = %error.code, error = %error, "document fetch failed");
                    Err(error)
                }
            }
        }
        .boxed()
        .shared()
    }
}
