//! Provider callbacks.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use mediaflow_core::types::JobId;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of a persisted-output callback.
#[derive(Debug, Deserialize)]
pub struct PersistedOutput {
    /// Durable URL of the finished artifact.
    pub url: String,
}

/// POST /api/v1/webhooks/predictions/{job_id}
///
/// Record the final artifact URL for a running job. The poller picks it
/// up when the provider reports success without a usable output.
pub async fn prediction_output(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(body): Json<PersistedOutput>,
) -> AppResult<impl IntoResponse> {
    let url = body.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AppError::BadRequest(
            "url must be an http(s) URL".to_string(),
        ));
    }

    let job = state
        .pipeline
        .record_persisted_output(job_id, url.to_string())
        .await?;

    tracing::info!(job_id = %job_id, "Persisted output recorded via webhook");

    Ok(Json(DataResponse { data: job }))
}
