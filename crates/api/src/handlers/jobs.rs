//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use mediaflow_core::error::CoreError;
use mediaflow_core::job::{Job, JobStatus};
use mediaflow_core::options::GenerationOptions;
use mediaflow_core::types::JobId;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

fn not_found(id: JobId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: id.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Validate the options and start a job. Returns 201 with the queued job;
/// generation continues in the background.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(options): Json<GenerationOptions>,
) -> AppResult<impl IntoResponse> {
    let job = state.pipeline.submit(options).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Optional filters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub user_id: Option<String>,
}

/// GET /api/v1/jobs
///
/// Newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let mut jobs: Vec<Job> = state
        .pipeline
        .list()
        .await
        .into_iter()
        .filter(|job| params.status.map_or(true, |s| job.status == s))
        .filter(|job| {
            params
                .user_id
                .as_deref()
                .map_or(true, |u| job.options.user_id.as_deref() == Some(u))
        })
        .collect();
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.pipeline.get(job_id).await.ok_or_else(|| not_found(job_id))?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancelling a finished job is not an error: the job is returned as is.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.pipeline.cancel(job_id).await?;

    tracing::info!(job_id = %job_id, status = ?job.status, "Job cancel requested");

    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Regenerate scene
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/scenes/{index}/regenerate
///
/// Re-render one scene of a finished multi-scene video and stitch again.
/// `index` is zero-based. Returns 202 with the reopened job.
pub async fn regenerate_scene(
    State(state): State<AppState>,
    Path((job_id, index)): Path<(JobId, usize)>,
) -> AppResult<impl IntoResponse> {
    let job = state.pipeline.regenerate_scene(job_id, index).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}
