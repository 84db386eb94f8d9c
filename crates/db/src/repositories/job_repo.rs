//! Repository for the `generation_jobs` table.

use mediaflow_core::job::JobStatus;
use mediaflow_core::types::JobId;
use sqlx::PgPool;

use crate::models::job::JobRow;

/// Column list for `generation_jobs` queries.
const COLUMNS: &str = "\
    id, media_type, status, user_id, options, progress, outputs, manifest, \
    error, created_at, started_at, completed_at, updated_at";

/// Statuses a job can be resumed from after a restart.
const UNFINISHED_STATUSES: [JobStatus; 4] = [
    JobStatus::Queued,
    JobStatus::Running,
    JobStatus::Upscaling,
    JobStatus::Encoding,
];

pub struct JobRepo;

impl JobRepo {
    /// Insert a job, or overwrite every mutable column if it already exists.
    pub async fn upsert(pool: &PgPool, row: &JobRow) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_jobs ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (id) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 progress = EXCLUDED.progress, \
                 outputs = EXCLUDED.outputs, \
                 manifest = EXCLUDED.manifest, \
                 error = EXCLUDED.error, \
                 started_at = EXCLUDED.started_at, \
                 completed_at = EXCLUDED.completed_at, \
                 updated_at = EXCLUDED.updated_at"
        );
        sqlx::query(&query)
            .bind(row.id)
            .bind(&row.media_type)
            .bind(&row.status)
            .bind(&row.user_id)
            .bind(&row.options)
            .bind(&row.progress)
            .bind(&row.outputs)
            .bind(&row.manifest)
            .bind(&row.error)
            .bind(row.created_at)
            .bind(row.started_at)
            .bind(row.completed_at)
            .bind(row.updated_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Non-terminal jobs, oldest first.
    pub async fn list_unfinished(pool: &PgPool) -> Result<Vec<JobRow>, sqlx::Error> {
        let statuses: Vec<&str> = UNFINISHED_STATUSES.iter().map(|s| s.as_str()).collect();
        let query = format!(
            "SELECT {COLUMNS} FROM generation_jobs \
             WHERE status = ANY($1) \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(&statuses)
            .fetch_all(pool)
            .await
    }
}
