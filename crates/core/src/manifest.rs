//! Orchestration state that must survive process restarts.
//!
//! Everything the pipeline relies on for control decisions (active
//! prediction, scene order, scene cursor, regeneration target) is a typed
//! field. The `extra` map is a loosely-typed side channel for
//! provider-specific bookkeeping and diagnostics only.

use serde::{Deserialize, Serialize};

use crate::job::BackendRole;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Prediction reference
// ---------------------------------------------------------------------------

/// The external prediction currently driving a job. At most one is active
/// per job; recording a new one supersedes the previous record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRef {
    /// Provider-assigned prediction id.
    pub id: String,
    /// Name of the backend that issued it.
    pub backend: String,
    pub role: BackendRole,
    /// Scene the prediction belongs to, for multi-scene video jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_index: Option<usize>,
    pub started_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Scenes
// ---------------------------------------------------------------------------

/// Per-scene lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Pending,
    Running,
    Completed,
}

/// One scene of a multi-scene video job. Scenes have no identity outside
/// their parent job; `order` is their position in both generation and
/// concatenation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub order: usize,
    pub prompt: String,
    pub status: SceneStatus,
    /// Completion percentage (0-100).
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub duration_secs: f64,
}

impl Scene {
    pub fn pending(order: usize, prompt: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            order,
            prompt: prompt.into(),
            status: SceneStatus::Pending,
            progress: 0,
            video_url: None,
            duration_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_prediction: Option<PredictionRef>,

    /// Ordered scene list; empty for non-video jobs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenes: Vec<Scene>,

    /// Next scene to start.
    #[serde(default)]
    pub current_scene_index: usize,

    /// Set while exactly one scene is being redone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerating_scene_index: Option<usize>,

    /// Final artifact URL written by an out-of-band persist step (prediction
    /// webhook). Consulted by the poller's post-success grace re-check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted_output: Option<String>,

    /// Provider bookkeeping and diagnostics.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    pub fn total_scenes(&self) -> usize {
        self.scenes.len()
    }

    /// Per-scene video URLs in order, `None` for scenes without a video.
    pub fn scene_urls(&self) -> Vec<Option<String>> {
        self.scenes.iter().map(|s| s.video_url.clone()).collect()
    }
}
