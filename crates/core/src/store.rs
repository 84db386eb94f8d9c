//! Persistence seams used by the job registry.
//!
//! The registry works without a store (pure in-process); when a
//! [`JobStore`] is attached every applied update is written through it
//! before subscribers are notified.

use async_trait::async_trait;
use serde::Serialize;

use crate::job::{Job, MediaType};
use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable job persistence.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn read_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Insert or overwrite the full job record.
    async fn write_job(&self, job: &Job) -> Result<(), StoreError>;

    /// All jobs not yet in a terminal state, oldest first.
    async fn list_unfinished(&self) -> Result<Vec<Job>, StoreError>;
}

/// A persisted artifact recorded for retention tracking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetainedFile {
    pub job_id: JobId,
    pub user_id: Option<String>,
    pub media_type: MediaType,
    pub url: String,
    pub content_type: String,
}

/// Records persisted artifacts for retention / cleanup policies.
#[async_trait]
pub trait FileRecorder: Send + Sync {
    async fn record_file(&self, file: &RetainedFile) -> Result<(), StoreError>;
}

/// Recorder used when no database is configured.
pub struct NoopFileRecorder;

#[async_trait]
impl FileRecorder for NoopFileRecorder {
    async fn record_file(&self, _file: &RetainedFile) -> Result<(), StoreError> {
        Ok(())
    }
}
