//! `user_files` row model.

use mediaflow_core::types::{JobId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `user_files` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserFile {
    pub id: i64,
    pub job_id: JobId,
    pub user_id: Option<String>,
    pub media_type: String,
    pub url: String,
    pub content_type: String,
    pub created_at: Timestamp,
}
