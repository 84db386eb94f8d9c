//! Job records, status machine, and progress reporting.
//!
//! A [`Job`] is the single unit of user-facing work. Its status moves
//! through `queued -> running -> (upscaling | encoding)* -> completed |
//! failed`; the two terminal states are sticky and only the explicit
//! scene-regeneration path (see [`crate::patch::reopen_for_scene`]) may
//! leave them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::manifest::Manifest;
use crate::options::GenerationOptions;
use crate::types::{JobId, Timestamp};

/// Failure reason recorded when the user cancels a job.
pub const CANCELLED_REASON: &str = "cancelled by user";

// ---------------------------------------------------------------------------
// Media type
// ---------------------------------------------------------------------------

/// The kind of artifact a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "3d")]
    Mesh3d,
    #[serde(rename = "cad")]
    Cad,
}

impl MediaType {
    /// Wire / database name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Mesh3d => "3d",
            Self::Cad => "cad",
        }
    }

    /// Parse from the wire / database name.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "3d" => Ok(Self::Mesh3d),
            "cad" => Ok(Self::Cad),
            other => Err(CoreError::Validation(format!(
                "Unknown media type '{other}'. Must be one of: image, video, 3d, cad"
            ))),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Backend role
// ---------------------------------------------------------------------------

/// The job a generation backend performs inside a pipeline.
///
/// Fallback chains are keyed by role rather than by media type because a
/// single media type may need several kinds of backend (a 3D job needs an
/// image generator and a mesh converter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendRole {
    /// Text-to-image generation.
    Image,
    /// Upscale / enhance an existing image.
    Enhance,
    /// Text-to-video generation.
    Video,
    /// Image-to-mesh conversion.
    Mesh,
    /// Image-to-mesh conversion tuned for CAD output.
    CadMesh,
}

impl BackendRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Enhance => "enhance",
            Self::Video => "video",
            Self::Mesh => "mesh",
            Self::CadMesh => "cad_mesh",
        }
    }

    /// The media type a role's output belongs to, used in user-facing
    /// error messages.
    pub fn media_type(self) -> MediaType {
        match self {
            Self::Image | Self::Enhance => MediaType::Image,
            Self::Video => MediaType::Video,
            Self::Mesh => MediaType::Mesh3d,
            Self::CadMesh => MediaType::Cad,
        }
    }
}

impl fmt::Display for BackendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Upscaling,
    Encoding,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Upscaling => "upscaling",
            Self::Encoding => "encoding",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "upscaling" => Ok(Self::Upscaling),
            "encoding" => Ok(Self::Encoding),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!("Unknown job status '{other}'"))),
        }
    }

    /// `completed` and `failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Advisory, UI-facing progress. Never used for control decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: String,
    /// Completion percentage (0-100).
    pub percent: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
}

impl Progress {
    /// Build a progress record; `percent` is clamped to 100.
    pub fn new(stage: impl Into<String>, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            percent: percent.min(100),
            message: message.into(),
            current_step: None,
            total_steps: None,
            eta_seconds: None,
        }
    }

    pub fn with_steps(mut self, current: u32, total: u32) -> Self {
        self.current_step = Some(current);
        self.total_steps = Some(total);
        self
    }

    pub fn with_eta(mut self, seconds: u64) -> Self {
        self.eta_seconds = Some(seconds);
        self
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new("queued", 0, "Waiting to start")
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// The unit of user-facing work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub options: GenerationOptions,
    pub status: JobStatus,
    pub progress: Progress,
    /// Ordered result locators. For multi-scene video jobs `outputs[i]` is
    /// scene `i`'s video until stitching replaces the list.
    pub outputs: Vec<String>,
    pub manifest: Manifest,
    /// Set only when `status == failed`.
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Job {
    /// Construct a fresh `queued` job with a new v7 id.
    pub fn new(options: GenerationOptions) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::now_v7(),
            options,
            status: JobStatus::Queued,
            progress: Progress::default(),
            outputs: Vec::new(),
            manifest: Manifest::default(),
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check the status / outputs / error invariants.
    ///
    /// - `completed` implies non-empty `outputs`.
    /// - `failed` implies `error` is set and `outputs` is empty.
    /// - `error` is set only when `failed`.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        match self.status {
            JobStatus::Completed if self.outputs.is_empty() => Err(CoreError::Validation(
                "A completed job must have at least one output".into(),
            )),
            JobStatus::Failed if self.error.is_none() => Err(CoreError::Validation(
                "A failed job must carry an error reason".into(),
            )),
            JobStatus::Failed if !self.outputs.is_empty() => Err(CoreError::Validation(
                "A failed job must not expose outputs".into(),
            )),
            status if status != JobStatus::Failed && self.error.is_some() => {
                Err(CoreError::Validation(format!(
                    "A {status} job must not carry an error reason"
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Update event
// ---------------------------------------------------------------------------

/// Emitted once for every applied registry update, after the change has
/// been recorded.
#[derive(Debug, Clone, Serialize)]
pub struct JobUpdate {
    /// Snapshot of the job after the update.
    pub job: Job,
    /// Status before the update was applied.
    pub previous_status: JobStatus,
}

impl JobUpdate {
    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    /// Whether this update moved the job to a different status.
    pub fn is_transition(&self) -> bool {
        self.previous_status != self.job.status
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
