use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prompthub_engine::{DocumentSource, FetchOutcome};
use prompthub_source::{GithubSource, GithubSourceConfig, RetryPolicy};
use prompthub_types::{DocumentKind, ErrorCode};
use serde_json::json;
use tokio::net::TcpListener;

const ETAG: &str = "\"greeting-v1\"";

#[derive(Clone, Default)]
struct MockGithub {
    flaky_calls: Arc<AtomicUsize>,
    greeting_calls: Arc<AtomicUsize>,
}

async fn template_contents(State(state): State<MockGithub>, Path(file): Path<String>, headers: HeaderMap) -> Response {
    match file.as_str() {
        "Greeting.json" => {
            state.greeting_calls.fetch_add(1, Ordering::SeqCst);
            let authorized = headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value == "Bearer test-token");
            if !authorized {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            if headers.get(header::IF_NONE_MATCH).and_then(|value| value.to_str().ok()) == Some(ETAG) {
                return StatusCode::NOT_MODIFIED.into_response();
            }
            ([(header::ETAG, ETAG)], Json(json!({ "title": "Greeting", "template": "Hello {name}", "variables": ["name"] }))).into_response()
        }
        "Flaky.json" => {
            if state.flaky_calls.fetch_add(1, Ordering::SeqCst) < 2 {
                StatusCode::BAD_GATEWAY.into_response()
            } else {
                Json(json!({ "template": "eventually" })).into_response()
            }
        }
        "Limited.json" => (StatusCode::FORBIDDEN, [("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "1717236000")]).into_response(),
        "Huge.json" => Json(json!({ "template": "x".repeat(4096) })).into_response(),
        "Broken.json" => "{ not json".into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn template_listing() -> Response {
    Json(json!([
        { "name": "Summarizer.json", "type": "file" },
        { "name": "README.md", "type": "file" },
        { "name": "Greeting.json", "type": "file" },
        { "name": "drafts", "type": "dir" }
    ]))
    .into_response()
}

async fn start_mock() -> (String, MockGithub) {
    let state = MockGithub::default();
    let app = Router::new()
        .route("/repos/acme/prompts/contents/templates", get(template_listing))
        .route("/repos/acme/prompts/contents/templates/{file}", get(template_contents))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
    let address = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    (format!("http://{address}"), state)
}

fn source_for(api_base: &str) -> GithubSource {
    let mut config = GithubSourceConfig::new("acme", "prompts");
    config.api_base = api_base.to_string();
    config.token = Some("test-token".into());
    config.max_file_size = 1024;
    config.retry = RetryPolicy {
        base_delay: Duration::from_millis(1),
        ..RetryPolicy::default()
    };
    GithubSource::new(config).expect("github source")
}

#[tokio::test]
async fn fetches_raw_documents_and_honours_etags() {
    let (api_base, _) = start_mock().await;
    let source = source_for(&api_base);

    let outcome = source
        .fetch_document(DocumentKind::Template, "Greeting", "main", None)
        .await
        .expect("fetch");
    let FetchOutcome::Fetched { document, version } = outcome else {
        panic!("expected a fetched document");
    };
    assert_eq!(document["template"], "Hello {name}");
    assert_eq!(version.as_deref(), Some(ETAG));

    let revalidated = source
        .fetch_document(DocumentKind::Template, "Greeting", "main", Some(ETAG))
        .await
        .expect("conditional fetch");
    assert_eq!(revalidated, FetchOutcome::NotModified);
}

#[tokio::test]
async fn missing_credentials_are_unauthorized_and_not_retried() {
    let (api_base, state) = start_mock().await;
    let mut config = GithubSourceConfig::new("acme", "prompts");
    config.api_base = api_base;
    let source = GithubSource::new(config).expect("github source");

    let error = source
        .fetch_document(DocumentKind::Template, "Greeting", "main", None)
        .await
        .expect_err("unauthorized");

    assert_eq!(error.code, ErrorCode::Unauthorized);
    assert_eq!(state.greeting_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_upstream_errors_are_retried() {
    let (api_base, state) = start_mock().await;
    let source = source_for(&api_base);

    let outcome = source
        .fetch_document(DocumentKind::Template, "Flaky", "main", None)
        .await
        .expect("third attempt succeeds");

    assert!(matches!(outcome, FetchOutcome::Fetched { .. }));
    assert_eq!(state.flaky_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failures_map_onto_error_codes() {
    let (api_base, _) = start_mock().await;
    let source = source_for(&api_base);

    let cases = [
        ("Missing", ErrorCode::NotFound),
        ("Limited", ErrorCode::RateLimited),
        ("Huge", ErrorCode::FileTooLarge),
        ("Broken", ErrorCode::ParseError),
        ("bad/name", ErrorCode::InvalidRequest),
    ];
    for (name, expected) in cases {
        let error = source
            .fetch_document(DocumentKind::Template, name, "main", None)
            .await
            .expect_err("fetch should fail");
        assert_eq!(error.code, expected, "document {name}: {error}");
    }
}

#[tokio::test]
async fn lists_template_names() {
    let (api_base, _) = start_mock().await;
    let source = source_for(&api_base);

    let names = source.list_documents(DocumentKind::Template, "main").await.expect("list");

    assert_eq!(names, vec!["Greeting", "Summarizer"]);
}
