//! `generation_jobs` row model.

use mediaflow_core::job::{Job, JobStatus, Progress};
use mediaflow_core::manifest::Manifest;
use mediaflow_core::options::GenerationOptions;
use mediaflow_core::store::StoreError;
use mediaflow_core::types::{JobId, Timestamp};
use sqlx::FromRow;

/// A row from the `generation_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: JobId,
    pub media_type: String,
    pub status: String,
    pub user_id: Option<String>,
    pub options: serde_json::Value,
    pub progress: serde_json::Value,
    pub outputs: serde_json::Value,
    pub manifest: serde_json::Value,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl JobRow {
    pub fn from_job(job: &Job) -> Result<Self, StoreError> {
        Ok(Self {
            id: job.id,
            media_type: job.options.media_type.as_str().to_string(),
            status: job.status.as_str().to_string(),
            user_id: job.options.user_id.clone(),
            options: serde_json::to_value(&job.options)?,
            progress: serde_json::to_value(&job.progress)?,
            outputs: serde_json::to_value(&job.outputs)?,
            manifest: serde_json::to_value(&job.manifest)?,
            error: job.error.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            updated_at: job.updated_at,
        })
    }

    pub fn into_job(self) -> Result<Job, StoreError> {
        let status = JobStatus::parse(&self.status)
            .map_err(|e| StoreError::Backend(format!("job {}: {e}", self.id)))?;
        let options: GenerationOptions = serde_json::from_value(self.options)?;
        let progress: Progress = serde_json::from_value(self.progress)?;
        let outputs: Vec<String> = serde_json::from_value(self.outputs)?;
        let manifest: Manifest = serde_json::from_value(self.manifest)?;

        Ok(Job {
            id: self.id,
            options,
            status,
            progress,
            outputs,
            manifest,
            error: self.error,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        })
    }
}
