//! GitHub contents API source.
//!
//! Documents live at `{dir}/{name}.json` in a repository. Each fetch is a
//! conditional `GET /repos/{owner}/{repo}/contents/{path}?ref={ref}` using the
//! raw media type, so the body is the document itself and the `ETag` header
//! becomes the version token for the next conditional request.

use std::time::Duration;

use async_trait::async_trait;
use prompthub_engine::{DocumentSource, FetchOutcome, FlowError};
use prompthub_types::DocumentKind;
use prompthub_util::{redact_sensitive, validate_repository_coordinate, validate_resource_name};
use reqwest::{Client, Response, StatusCode, Url, header};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{error::SourceError, retry::RetryPolicy};

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
pub const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
pub const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const SUBSYSTEM: &str = "github/contents";
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Connection settings for [`GithubSource`].
#[derive(Debug, Clone)]
pub struct GithubSourceConfig {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub token: Option<String>,
    pub template_dir: String,
    pub flow_dir: String,
    pub max_file_size: u64,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl GithubSourceConfig {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: None,
            template_dir: DocumentKind::Template.default_directory().to_string(),
            flow_dir: DocumentKind::Flow.default_directory().to_string(),
            max_file_size: prompthub_engine::config::DEFAULT_MAX_FILE_SIZE,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Fetches documents through the GitHub REST contents API.
#[derive(Debug, Clone)]
pub struct GithubSource {
    http: Client,
    api_base: Url,
    config: GithubSourceConfig,
}

impl GithubSource {
    pub fn new(config: GithubSourceConfig) -> Result<Self, SourceError> {
        let api_base = validate_api_base(&config.api_base)?;
        for segment in [&config.owner, &config.repo] {
            validate_repository_coordinate(segment)?;
        }

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static(RAW_MEDIA_TYPE));
        default_headers.insert("x-github-api-version", header::HeaderValue::from_static("2022-11-28"));
        if let Some(token) = config.token.as_deref().filter(|token| !token.trim().is_empty()) {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| SourceError::Config("GitHub token contains characters not allowed in a header".into()))?;
            value.set_sensitive(true);
            default_headers.insert(header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(default_headers)
            .user_agent(concat!("prompthub/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|error| SourceError::Config(format!("build http client: {error}")))?;

        Ok(Self { http, api_base, config })
    }

    fn directory(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Template => &self.config.template_dir,
            DocumentKind::Flow => &self.config.flow_dir,
        }
    }

    fn contents_url(&self, path: &str) -> Result<Url, SourceError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Config(format!("API base '{}' cannot carry a path", self.api_base)))?
            .pop_if_empty()
            .extend(["repos", self.config.owner.as_str(), self.config.repo.as_str(), "contents"])
            .extend(path.split('/'));
        Ok(url)
    }

    async fn fetch_once(&self, path: &str, reference: &str, known_version: Option<&str>) -> Result<FetchOutcome, SourceError> {
        let url = self.contents_url(path)?;
        debug!(url = %redact_sensitive(url.as_str()), reference = %reference, conditional = known_version.is_some(), "fetching document");

        let mut request = self.http.get(url).query(&[("ref", reference)]);
        if let Some(version) = known_version {
            request = request.header(header::IF_NONE_MATCH, version);
        }
        let response = request.send().await.map_err(|error| network_error(path, &error))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!(path = %path, "document not modified");
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(classify_failure(status, response.headers(), path, reference));
        }

        let version = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = self.read_limited_body(response, path).await?;
        let document: Value = serde_json::from_slice(&body).map_err(|error| SourceError::Parse {
            path: path.to_string(),
            message: error.to_string(),
        })?;

        info!(path = %path, reference = %reference, bytes = body.len(), "document fetched from GitHub");
        Ok(FetchOutcome::Fetched { document, version })
    }

    async fn read_limited_body(&self, response: Response, path: &str) -> Result<Vec<u8>, SourceError> {
        let limit = self.config.max_file_size;
        if let Some(size) = response.content_length()
            && size > limit
        {
            return Err(SourceError::FileTooLarge {
                path: path.to_string(),
                size,
                limit,
            });
        }
        let body = response.bytes().await.map_err(|error| network_error(path, &error))?;
        let size = body.len() as u64;
        if size > limit {
            return Err(SourceError::FileTooLarge {
                path: path.to_string(),
                size,
                limit,
            });
        }
        Ok(body.to_vec())
    }

    async fn list_once(&self, directory: &str, reference: &str) -> Result<Vec<String>, SourceError> {
        let url = self.contents_url(directory)?;
        let response = self
            .http
            .get(url)
            .query(&[("ref", reference)])
            .header(header::ACCEPT, JSON_MEDIA_TYPE)
            .send()
            .await
            .map_err(|error| network_error(directory, &error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_failure(status, response.headers(), directory, reference));
        }
        let body = self.read_limited_body(response, directory).await?;
        let entries: Vec<ContentEntry> = serde_json::from_slice(&body).map_err(|error| SourceError::Parse {
            path: directory.to_string(),
            message: error.to_string(),
        })?;
        Ok(document_names(entries))
    }
}

#[async_trait]
impl DocumentSource for GithubSource {
    async fn fetch_document(
        &self,
        kind: DocumentKind,
        name: &str,
        reference: &str,
        known_version: Option<&str>,
    ) -> Result<FetchOutcome, FlowError> {
        let name = validate_resource_name(name).map_err(|error| SourceError::from(error).into_flow_error(SUBSYSTEM))?;
        let path = format!("{}/{}.json", self.directory(kind), name);
        let path = path.as_str();

        self.config
            .retry
            .run(path, move || self.fetch_once(path, reference, known_version))
            .await
            .map_err(|error| error.into_flow_error(SUBSYSTEM))
    }

    async fn list_documents(&self, kind: DocumentKind, reference: &str) -> Result<Vec<String>, FlowError> {
        let directory = self.directory(kind);
        self.config
            .retry
            .run(directory, move || self.list_once(directory, reference))
            .await
            .map_err(|error| error.into_flow_error(SUBSYSTEM))
    }
}

/// Maps a non-success GitHub response onto the error model.
pub fn classify_failure(status: StatusCode, headers: &header::HeaderMap, path: &str, reference: &str) -> SourceError {
    let rate_limit_exhausted = headers
        .get(RATE_LIMIT_REMAINING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|remaining| remaining.trim() == "0");
    let reset_at = headers
        .get(RATE_LIMIT_RESET)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match status {
        StatusCode::NOT_FOUND => SourceError::NotFound {
            path: path.to_string(),
            reference: reference.to_string(),
        },
        StatusCode::UNAUTHORIZED => SourceError::Unauthorized { status: status.as_u16() },
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited {
            path: path.to_string(),
            reset_at,
        },
        StatusCode::FORBIDDEN if rate_limit_exhausted => SourceError::RateLimited {
            path: path.to_string(),
            reset_at,
        },
        StatusCode::FORBIDDEN => SourceError::Unauthorized { status: status.as_u16() },
        _ if status.is_client_error() => SourceError::Rejected {
            path: path.to_string(),
            status: status.as_u16(),
        },
        _ => SourceError::Upstream {
            path: path.to_string(),
            status: status.as_u16(),
        },
    }
}

fn network_error(path: &str, error: &reqwest::Error) -> SourceError {
    SourceError::Network {
        path: path.to_string(),
        message: redact_sensitive(&error.to_string()),
    }
}

fn document_names(entries: Vec<ContentEntry>) -> Vec<String> {
    let mut names: Vec<String> = entries
        .into_iter()
        .filter(|entry| entry.kind == "file")
        .filter_map(|entry| entry.name.strip_suffix(".json").map(str::to_string))
        .filter(|name| validate_resource_name(name).is_ok())
        .collect();
    names.sort();
    names
}

/// Only `https` is accepted, except for local hosts.
fn validate_api_base(base: &str) -> Result<Url, SourceError> {
    let url = Url::parse(base).map_err(|error| SourceError::Config(format!("invalid API base URL '{base}': {error}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| SourceError::Config(format!("API base URL '{base}' must include a host")))?;
    let is_local = LOCALHOST_DOMAINS.iter().any(|local| host.eq_ignore_ascii_case(local));
    if !is_local && url.scheme() != "https" {
        return Err(SourceError::Config(format!(
            "API base URL must use https for non-localhost hosts; got '{}://'",
            url.scheme()
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prompthub_types::ErrorCode;

    fn headers(pairs: &[(&'static str, &'static str)]) -> header::HeaderMap {
        let mut map = header::HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, header::HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn status_codes_map_onto_error_codes() {
        let cases = [
            (StatusCode::NOT_FOUND, headers(&[]), ErrorCode::NotFound),
            (StatusCode::UNAUTHORIZED, headers(&[]), ErrorCode::Unauthorized),
            (StatusCode::FORBIDDEN, headers(&[("x-ratelimit-remaining", "0")]), ErrorCode::RateLimited),
            (StatusCode::FORBIDDEN, headers(&[("x-ratelimit-remaining", "12")]), ErrorCode::Unauthorized),
            (StatusCode::TOO_MANY_REQUESTS, headers(&[]), ErrorCode::RateLimited),
            (StatusCode::BAD_GATEWAY, headers(&[]), ErrorCode::GithubError),
            (StatusCode::SERVICE_UNAVAILABLE, headers(&[]), ErrorCode::GithubError),
            (StatusCode::BAD_REQUEST, headers(&[]), ErrorCode::InvalidRequest),
            (StatusCode::UNPROCESSABLE_ENTITY, headers(&[]), ErrorCode::InvalidRequest),
        ];
        for (status, headers, expected) in cases {
            assert_eq!(classify_failure(status, &headers, "templates/T.json", "main").code(), expected, "status {status}");
        }
    }

    #[test]
    fn client_errors_are_not_retried() {
        let rejected = classify_failure(StatusCode::UNPROCESSABLE_ENTITY, &headers(&[]), "templates/T.json", "main");
        assert!(!rejected.is_transient());
        let upstream = classify_failure(StatusCode::BAD_GATEWAY, &headers(&[]), "templates/T.json", "main");
        assert!(upstream.is_transient());
    }

    #[test]
    fn contents_urls_are_built_from_segments() {
        let mut config = GithubSourceConfig::new("acme", "prompts");
        config.api_base = "https://github.example.com/api/v3/".into();
        let source = GithubSource::new(config).expect("source");

        let url = source.contents_url("templates/Greeting.json").expect("url");
        assert_eq!(url.as_str(), "https://github.example.com/api/v3/repos/acme/prompts/contents/templates/Greeting.json");
    }

    #[test]
    fn plain_http_is_only_allowed_for_local_hosts() {
        assert!(validate_api_base("http://127.0.0.1:8080").is_ok());
        assert!(validate_api_base("https://api.github.com").is_ok());
        assert!(matches!(validate_api_base("http://api.github.com"), Err(SourceError::Config(_))));
    }

    #[test]
    fn owners_with_path_characters_are_rejected() {
        let config = GithubSourceConfig::new("acme/../other", "prompts");
        assert!(matches!(GithubSource::new(config), Err(SourceError::InvalidName(_))));
    }

    #[test]
    fn dotted_repository_names_are_accepted() {
        let source = GithubSource::new(GithubSourceConfig::new("acme", "prompts.github.io")).expect("dotted repo");
        let url = source.contents_url("flows/daily.json").expect("url");
        assert_eq!(url.as_str(), "https://api.github.com/repos/acme/prompts.github.io/contents/flows/daily.json");

        assert!(matches!(
            GithubSource::new(GithubSourceConfig::new("acme", "..")),
            Err(SourceError::InvalidName(_))
        ));
    }

    #[test]
    fn listings_keep_json_files_only() {
        let entries = vec![
            ContentEntry { name: "b.json".into(), kind: "file".into() },
            ContentEntry { name: "README.md".into(), kind: "file".into() },
            ContentEntry { name: "a.json".into(), kind: "file".into() },
            ContentEntry { name: "nested.json".into(), kind: "dir".into() },
        ];
        assert_eq!(document_names(entries), vec!["a", "b"]);
    }
}
