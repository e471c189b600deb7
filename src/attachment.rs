//! Attachment specs and the loader that turns them into shared payloads.
//!
//! Attachments are loaded once per dispatch, before any recipient is
//! processed, and then shared read-only by every message in the batch.
//! A single unreadable source fails the whole dispatch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DispatchError;

/// A requested attachment: a filename and where to read it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSpec {
    /// Filename shown to the recipient
    pub filename: String,
    /// Source locator (a filesystem path for [`FileAttachmentLoader`])
    #[serde(alias = "path")]
    pub source: String,
    /// Explicit MIME type; guessed from the filename when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl AttachmentSpec {
    /// Create a spec with a guessed content type.
    pub fn new(filename: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            source: source.into(),
            content_type: None,
        }
    }

    /// Set the content type explicitly.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The explicit content type, or one guessed from the filename.
    pub fn resolved_content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.filename)
                .first_or_octet_stream()
                .to_string()
        })
    }
}

/// An attachment read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl LoadedAttachment {
    /// Create a loaded attachment from raw bytes.
    ///
    /// Content type is guessed from the filename extension.
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();
        Self {
            filename,
            content_type,
            data,
        }
    }

    /// Set the content type explicitly.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// The loaded attachment set for one dispatch, shared by every message.
pub type SharedAttachments = Arc<[LoadedAttachment]>;

/// Loads attachment specs into memory.
#[async_trait]
pub trait AttachmentLoader: Send + Sync {
    /// Load every spec, preserving order.
    ///
    /// Fails with [`DispatchError::AttachmentReadError`] naming the first
    /// attachment that could not be read.
    async fn load(&self, specs: &[AttachmentSpec]) -> Result<Vec<LoadedAttachment>, DispatchError>;
}

/// Reads attachment sources from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileAttachmentLoader {
    base_dir: Option<PathBuf>,
}

impl FileAttachmentLoader {
    /// Loader resolving relative paths against the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader resolving relative paths against `dir`.
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
        }
    }

    fn resolve(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl AttachmentLoader for FileAttachmentLoader {
    async fn load(&self, specs: &[AttachmentSpec]) -> Result<Vec<LoadedAttachment>, DispatchError> {
        let mut loaded = Vec::with_capacity(specs.len());
        for spec in specs {
            let path = self.resolve(&spec.source);
            let data = tokio::fs::read(&path).await.map_err(|e| {
                tracing::error!(filename = %spec.filename, path = %path.display(), error = %e, "Attachment read failed");
                DispatchError::attachment(&spec.filename, format!("{}: {}", path.display(), e))
            })?;
            tracing::debug!(filename = %spec.filename, bytes = data.len(), "Attachment loaded");
            loaded.push(LoadedAttachment {
                filename: spec.filename.clone(),
                content_type: spec.resolved_content_type(),
                data,
            });
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_guesses_type() {
        let a = LoadedAttachment::from_bytes("marks.pdf", b"%PDF".to_vec());
        assert_eq!(a.content_type, "application/pdf");
        assert_eq!(a.size(), 4);

        let unknown = LoadedAttachment::from_bytes("file.unknown_ext_12345", vec![]);
        assert_eq!(unknown.content_type, "application/octet-stream");
    }

    #[test]
    fn test_spec_content_type() {
        assert_eq!(
            AttachmentSpec::new("sheet.csv", "/tmp/sheet.csv").resolved_content_type(),
            "text/csv"
        );
        assert_eq!(
            AttachmentSpec::new("sheet.csv", "/tmp/sheet.csv")
                .content_type("application/vnd.ms-excel")
                .resolved_content_type(),
            "application/vnd.ms-excel"
        );
    }

    #[test]
    fn test_spec_accepts_path_alias() {
        let spec: AttachmentSpec =
            serde_json::from_str(r#"{"filename":"a.txt","path":"/tmp/a.txt"}"#).unwrap();
        assert_eq!(spec.source, "/tmp/a.txt");
        assert_eq!(spec.content_type, None);
    }

    #[test]
    fn test_base_dir_resolution() {
        let loader = FileAttachmentLoader::with_base_dir("/srv/uploads");
        assert_eq!(loader.resolve("a.pdf"), PathBuf::from("/srv/uploads/a.pdf"));
        assert_eq!(loader.resolve("/abs/a.pdf"), PathBuf::from("/abs/a.pdf"));
    }
}
