//! [`JobStore`] and [`FileRecorder`] backed by PostgreSQL.

use async_trait::async_trait;
use mediaflow_core::job::Job;
use mediaflow_core::store::{FileRecorder, JobStore, RetainedFile, StoreError};
use mediaflow_core::types::JobId;

use crate::models::job::JobRow;
use crate::repositories::{JobRepo, UserFileRepo};
use crate::DbPool;

#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn read_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        JobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(backend)?
            .map(JobRow::into_job)
            .transpose()
    }

    async fn write_job(&self, job: &Job) -> Result<(), StoreError> {
        let row = JobRow::from_job(job)?;
        JobRepo::upsert(&self.pool, &row).await.map_err(backend)
    }

    async fn list_unfinished(&self) -> Result<Vec<Job>, StoreError> {
        let rows = JobRepo::list_unfinished(&self.pool).await.map_err(backend)?;
        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match row.into_job() {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Skipping unreadable job row");
                }
            }
        }
        Ok(jobs)
    }
}

#[async_trait]
impl FileRecorder for PgJobStore {
    async fn record_file(&self, file: &RetainedFile) -> Result<(), StoreError> {
        let row = UserFileRepo::insert(&self.pool, file).await.map_err(backend)?;
        tracing::debug!(job_id = %file.job_id, file_id = row.id, "Recorded retained file");
        Ok(())
    }
}
