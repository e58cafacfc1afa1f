//! Local directory source.
//!
//! Reads `{root}/{templates|flows}/{name}.json`. Refs are ignored; the file's
//! modification time and length form the version token.

use std::{
    io,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use async_trait::async_trait;
use prompthub_engine::{DocumentSource, FetchOutcome, FlowError};
use prompthub_types::DocumentKind;
use prompthub_util::validate_resource_name;
use serde_json::Value;
use tracing::debug;

use crate::error::SourceError;

const SUBSYSTEM: &str = "local/files";

/// Serves documents from a directory tree.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
    template_dir: String,
    flow_dir: String,
    max_file_size: u64,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            root: root.into(),
            template_dir: DocumentKind::Template.default_directory().to_string(),
            flow_dir: DocumentKind::Flow.default_directory().to_string(),
            max_file_size,
        }
    }

    pub fn with_directories(mut self, template_dir: impl Into<String>, flow_dir: impl Into<String>) -> Self {
        self.template_dir = template_dir.into();
        self.flow_dir = flow_dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory(&self, kind: DocumentKind) -> PathBuf {
        match kind {
            DocumentKind::Template => self.root.join(&self.template_dir),
            DocumentKind::Flow => self.root.join(&self.flow_dir),
        }
    }

    async fn read_document(&self, kind: DocumentKind, name: &str, known_version: Option<&str>) -> Result<FetchOutcome, SourceError> {
        let name = validate_resource_name(name)?;
        let path = self.directory(kind).join(format!("{name}.json"));
        let display_path = path.display().to_string();

        let metadata = tokio::fs::metadata(&path).await.map_err(|error| io_error(&display_path, error))?;
        if metadata.len() > self.max_file_size {
            return Err(SourceError::FileTooLarge {
                path: display_path,
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }

        let version = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|since_epoch| format!("{}-{}", since_epoch.as_nanos(), metadata.len()));
        if let (Some(known), Some(current)) = (known_version, version.as_deref())
            && known == current
        {
            debug!(path = %display_path, "local document unchanged");
            return Ok(FetchOutcome::NotModified);
        }

        let body = tokio::fs::read(&path).await.map_err(|error| io_error(&display_path, error))?;
        let document: Value = serde_json::from_slice(&body).map_err(|error| SourceError::Parse {
            path: display_path.clone(),
            message: error.to_string(),
        })?;
        debug!(path = %display_path, bytes = body.len(), "local document loaded");
        Ok(FetchOutcome::Fetched { document, version })
    }

    async fn read_names(&self, kind: DocumentKind) -> Result<Vec<String>, SourceError> {
        let directory = self.directory(kind);
        let display_path = directory.display().to_string();
        let mut entries = tokio::fs::read_dir(&directory).await.map_err(|error| io_error(&display_path, error))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|error| io_error(&display_path, error))? {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|extension| extension.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
                && validate_resource_name(stem).is_ok()
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

fn io_error(path: &str, error: io::Error) -> SourceError {
    match error.kind() {
        io::ErrorKind::NotFound => SourceError::NotFound {
            path: path.to_string(),
            reference: "local".to_string(),
        },
        _ => SourceError::Io {
            path: path.to_string(),
            message: error.to_string(),
        },
    }
}

#[async_trait]
impl DocumentSource for LocalSource {
    async fn fetch_document(
        &self,
        kind: DocumentKind,
        name: &str,
        _reference: &str,
        known_version: Option<&str>,
    ) -> Result<FetchOutcome, FlowError> {
        self.read_document(kind, name, known_version)
            .await
            .map_err(|error| error.into_flow_error(SUBSYSTEM))
    }

    async fn list_documents(&self, kind: DocumentKind, _reference: &str) -> Result<Vec<String>, FlowError> {
        self.read_names(kind).await.map_err(|error| error.into_flow_error(SUBSYSTEM))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prompthub_types::ErrorCode;
    use serde_json::json;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        std::fs::write(path, contents).expect("write document");
    }

    #[tokio::test]
    async fn fetches_documents_and_reports_not_modified() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "templates/Greeting.json", r#"{ "template": "Hello {name}" }"#);
        let source = LocalSource::new(temp.path(), 1024);

        let outcome = source
            .fetch_document(DocumentKind::Template, "Greeting", "main", None)
            .await
            .expect("fetch");
        let FetchOutcome::Fetched { document, version } = outcome else {
            panic!("expected a fetched document");
        };
        assert_eq!(document, json!({ "template": "Hello {name}" }));

        let again = source
            .fetch_document(DocumentKind::Template, "Greeting", "main", version.as_deref())
            .await
            .expect("conditional fetch");
        assert_eq!(again, FetchOutcome::NotModified);
    }

    #[tokio::test]
    async fn maps_missing_oversized_and_malformed_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "flows/big.json", &format!("{{\"pad\": \"{}\"}}", "x".repeat(64)));
        write(temp.path(), "flows/broken.json", "{ not json");
        let source = LocalSource::new(temp.path(), 32);

        let missing = source.fetch_document(DocumentKind::Flow, "absent", "main", None).await.expect_err("missing");
        assert_eq!(missing.code, ErrorCode::NotFound);

        let big = source.fetch_document(DocumentKind::Flow, "big", "main", None).await.expect_err("too large");
        assert_eq!(big.code, ErrorCode::FileTooLarge);

        let broken = source.fetch_document(DocumentKind::Flow, "broken", "main", None).await.expect_err("malformed");
        assert_eq!(broken.code, ErrorCode::ParseError);

        let invalid = source.fetch_document(DocumentKind::Flow, "../secret", "main", None).await.expect_err("invalid");
        assert_eq!(invalid.code, ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn lists_json_documents_sorted() {
        let temp = tempfile::tempdir().expect("tempdir");
        write(temp.path(), "templates/b.json", "{}");
        write(temp.path(), "templates/a.json", "{}");
        write(temp.path(), "templates/notes.txt", "ignored");
        let source = LocalSource::new(temp.path(), 1024);

        let names = source.list_documents(DocumentKind::Template, "main").await.expect("list");
        assert_eq!(names, vec!["a", "b"]);
    }
}
