//! WebSocket message type constants for job update events.
//!
//! Used by the API's update bridge when broadcasting job lifecycle
//! updates to connected WebSocket clients.

/// Progress update while a job is still active.
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Job was cancelled by the user.
pub const MSG_TYPE_JOB_CANCELLED: &str = "job_cancelled";
