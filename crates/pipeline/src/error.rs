//! Pipeline error taxonomy.
//!
//! Every failure inside a job's task ends up as one of these variants and
//! is turned into the job's `error` string by
//! [`PipelineError::user_message`].

use std::time::Duration;

use mediaflow_core::error::CoreError;
use mediaflow_core::job::{BackendRole, CANCELLED_REASON};
use mediaflow_providers::BackendError;

/// Reason recorded when a job task panics.
pub const INTERNAL_ERROR_REASON: &str = "internal error during generation";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The request itself is invalid. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend {backend} is over quota or rate limited: {detail}")]
    QuotaOrRateLimit { backend: String, detail: String },

    /// Never retried against another backend.
    #[error("Content policy rejection: {0}")]
    ContentPolicy(String),

    #[error("Backend {backend} failed: {detail}")]
    BackendFailure { backend: String, detail: String },

    #[error("All {role} backends unavailable (tried {attempted:?}): {last}")]
    AllBackendsUnavailable {
        role: BackendRole,
        attempted: Vec<String>,
        last: Box<PipelineError>,
    },

    #[error("Timed out waiting for {what} after {elapsed:?}")]
    Timeout { what: String, elapsed: Duration },

    /// The user cancelled the job. The registry has already finalized it.
    #[error("Cancelled")]
    Cancelled,

    /// The job was finished by another path while this task was working on
    /// it. Nothing more may be written.
    #[error("Job was finalized elsewhere")]
    Superseded,

    #[error("Stitching failed: {0}")]
    Stitch(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PipelineError {
    /// Classify a single backend's failure.
    pub fn from_backend(backend: &str, error: BackendError) -> Self {
        match error {
            BackendError::ContentPolicy(detail) => Self::ContentPolicy(detail),
            e if e.is_quota_or_rate_limit() => Self::QuotaOrRateLimit {
                backend: backend.to_string(),
                detail: e.to_string(),
            },
            e => Self::BackendFailure {
                backend: backend.to_string(),
                detail: e.to_string(),
            },
        }
    }

    /// Whether the task should stop without writing to the job.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Superseded)
    }

    /// The stable, human-readable reason stored in `Job.error`.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(detail) => format!("invalid request: {detail}"),
            Self::QuotaOrRateLimit { backend, .. } => {
                format!("generation backend {backend} is over quota or rate limited")
            }
            Self::ContentPolicy(detail) => {
                format!("request rejected by content policy: {detail}")
            }
            Self::BackendFailure { backend, detail } => {
                format!("generation failed on {backend}: {detail}")
            }
            Self::AllBackendsUnavailable {
                role,
                attempted,
                last,
            } => format!(
                "all {} backends unavailable (tried {}); last error: {}",
                role.media_type(),
                attempted.join(", "),
                last.user_message()
            ),
            Self::Timeout { what, elapsed } => {
                format!("timed out waiting for {what} after {}s", elapsed.as_secs())
            }
            Self::Cancelled => CANCELLED_REASON.to_string(),
            Self::Superseded => "job was finalized by another request".to_string(),
            Self::Stitch(detail) => format!("failed to stitch scenes: {detail}"),
            Self::Persistence(detail) => {
                format!("failed to store the generated artifact: {detail}")
            }
            Self::Core(e) => e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
