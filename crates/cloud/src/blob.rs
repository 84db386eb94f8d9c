//! Blob store seam and the local-disk implementation.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use mediaflow_core::job::MediaType;
use mediaflow_core::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Failed to sign URL: {0}")]
    Presign(String),
}

/// Durable storage for generated artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` and return a URL clients can fetch it from.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// A public or signed URL for an already stored object.
    async fn url_for(&self, path: &str) -> Result<String, StorageError>;
}

/// Object path for a named artifact of a job, e.g.
/// `video/0190.../scene-1.mp4`.
pub fn artifact_path(media_type: MediaType, job_id: JobId, name: &str, content_type: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        media_type.as_str(),
        job_id,
        name,
        extension_for(content_type)
    )
}

/// File extension for a content type; unknown types map to `bin`.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "model/gltf-binary" => "glb",
        "model/gltf+json" => "gltf",
        "model/obj" => "obj",
        "model/stl" | "application/sla" => "stl",
        "model/step" | "application/step" => "step",
        _ => "bin",
    }
}

/// Reject absolute paths and parent-directory components.
pub(crate) fn check_relative(path: &str) -> Result<(), StorageError> {
    let candidate = Path::new(path);
    let valid = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidPath(path.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Local disk
// ---------------------------------------------------------------------------

/// Stores artifacts under a root directory served at `public_base_url`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        check_relative(path)?;
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        tracing::debug!(path, content_type, size = bytes.len(), "Stored artifact on disk");
        Ok(self.public_url(path))
    }

    async fn url_for(&self, path: &str) -> Result<String, StorageError> {
        check_relative(path)?;
        Ok(self.public_url(path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
