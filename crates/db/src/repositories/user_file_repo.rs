//! Repository for the `user_files` retention table.

use mediaflow_core::store::RetainedFile;
use sqlx::PgPool;

use crate::models::user_file::UserFile;

const COLUMNS: &str = "id, job_id, user_id, media_type, url, content_type, created_at";

pub struct UserFileRepo;

impl UserFileRepo {
    pub async fn insert(pool: &PgPool, file: &RetainedFile) -> Result<UserFile, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_files (job_id, user_id, media_type, url, content_type) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserFile>(&query)
            .bind(file.job_id)
            .bind(&file.user_id)
            .bind(file.media_type.as_str())
            .bind(&file.url)
            .bind(&file.content_type)
            .fetch_one(pool)
            .await
    }
}
