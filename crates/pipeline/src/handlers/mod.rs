//! Per-media-type pipelines.
//!
//! Each handler drives one job from `queued` to `completed` and returns
//! `Err` for anything else; the caller turns the error into the job's
//! failure reason.

pub mod image;
pub mod mesh;
pub mod video;

use mediaflow_core::job::BackendRole;

use crate::error::PipelineError;

/// The first URL of a prediction result.
pub(crate) fn first_url(urls: Vec<String>, role: BackendRole) -> Result<String, PipelineError> {
    urls.into_iter()
        .next()
        .ok_or_else(|| PipelineError::BackendFailure {
            backend: role.to_string(),
            detail: "result contained no output URL".into(),
        })
}
