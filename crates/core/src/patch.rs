//! Partial job updates and their merge semantics.
//!
//! Every mutation of a [`Job`] is expressed as a [`JobPatch`] and applied
//! with [`apply_patch`]. Application is all-or-nothing: the patch is
//! merged into a copy, the copy is checked against the job invariants, and
//! only then does it replace the original.
//!
//! Field merge is last-writer-wins, except `outputs`, which is patched
//! with list operations ([`OutputsPatch`]); an append from a polling loop
//! never loses a concurrent write.

use serde::Serialize;

use crate::error::CoreError;
use crate::job::{Job, JobStatus, Progress};
use crate::manifest::{PredictionRef, Scene, SceneStatus};
use crate::types::Timestamp;

/// Key under which outputs withdrawn from a failed job are kept for
/// diagnostics.
pub const PARTIAL_OUTPUTS_KEY: &str = "partial_outputs";

// ---------------------------------------------------------------------------
// Patch types
// ---------------------------------------------------------------------------

/// List operation applied to `Job.outputs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutputsPatch {
    Replace { urls: Vec<String> },
    Append { url: String },
    Set { index: usize, url: String },
}

/// Partial update of one scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenePatch {
    pub index: usize,
    pub status: Option<SceneStatus>,
    pub progress: Option<u8>,
    pub video_url: Option<String>,
}

/// A partial job update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<Progress>,
    pub outputs: Option<OutputsPatch>,
    /// Failure reason; only meaningful together with `status: failed`.
    pub error: Option<String>,
    /// `Some(None)` clears the active prediction.
    pub active_prediction: Option<Option<PredictionRef>>,
    pub scenes: Option<Vec<Scene>>,
    pub scene: Option<ScenePatch>,
    pub current_scene_index: Option<usize>,
    /// `Some(None)` clears the regeneration flag.
    pub regenerating_scene_index: Option<Option<usize>>,
    pub persisted_output: Option<String>,
    /// Keys merged into `manifest.extra`.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to a non-terminal status with a progress message.
    pub fn stage(status: JobStatus, progress: Progress) -> Self {
        Self {
            status: Some(status),
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn progress(progress: Progress) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    /// Complete the job with the given outputs.
    pub fn completed(outputs: Vec<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            outputs: Some(OutputsPatch::Replace { urls: outputs }),
            ..Self::default()
        }
    }

    /// Complete the job keeping the outputs already recorded.
    pub fn completed_in_place() -> Self {
        Self {
            status: Some(JobStatus::Completed),
            ..Self::default()
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_outputs(mut self, outputs: OutputsPatch) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_active_prediction(mut self, prediction: Option<PredictionRef>) -> Self {
        self.active_prediction = Some(prediction);
        self
    }

    pub fn with_scene(mut self, scene: ScenePatch) -> Self {
        self.scene = Some(scene);
        self
    }

    pub fn with_scenes(mut self, scenes: Vec<Scene>) -> Self {
        self.scenes = Some(scenes);
        self
    }

    pub fn with_current_scene_index(mut self, index: usize) -> Self {
        self.current_scene_index = Some(index);
        self
    }

    pub fn with_regenerating_scene_index(mut self, index: Option<usize>) -> Self {
        self.regenerating_scene_index = Some(index);
        self
    }

    pub fn with_persisted_output(mut self, url: impl Into<String>) -> Self {
        self.persisted_output = Some(url.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Merge `patch` into `job`.
///
/// Returns [`CoreError::Conflict`] if the job is already terminal (terminal
/// states are sticky), and [`CoreError::Validation`] if the patch is out of
/// bounds or would break a job invariant. On error `job` is unchanged.
pub fn apply_patch(job: &mut Job, patch: JobPatch, now: Timestamp) -> Result<(), CoreError> {
    if job.is_terminal() {
        return Err(CoreError::Conflict(format!(
            "Job {} is already {}",
            job.id, job.status
        )));
    }

    let mut next = job.clone();

    // -- manifest --
    if let Some(scenes) = patch.scenes {
        next.manifest.scenes = scenes;
    }
    if let Some(scene_patch) = patch.scene {
        let total = next.manifest.scenes.len();
        let scene = next
            .manifest
            .scenes
            .get_mut(scene_patch.index)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Scene index {} out of range (job has {total} scenes)",
                    scene_patch.index
                ))
            })?;
        if let Some(status) = scene_patch.status {
            scene.status = status;
        }
        if let Some(progress) = scene_patch.progress {
            scene.progress = progress.min(100);
        }
        if let Some(url) = scene_patch.video_url {
            scene.video_url = Some(url);
        }
    }
    if let Some(index) = patch.current_scene_index {
        next.manifest.current_scene_index = index;
    }
    if let Some(index) = patch.regenerating_scene_index {
        next.manifest.regenerating_scene_index = index;
    }
    if let Some(prediction) = patch.active_prediction {
        // A new prediction supersedes any output recorded for the old one.
        if prediction.is_some() {
            next.manifest.persisted_output = None;
        }
        next.manifest.active_prediction = prediction;
    }
    if let Some(url) = patch.persisted_output {
        next.manifest.persisted_output = Some(url);
    }
    next.manifest.extra.extend(patch.extra);

    // -- outputs --
    match patch.outputs {
        Some(OutputsPatch::Replace { urls }) => next.outputs = urls,
        Some(OutputsPatch::Append { url }) => next.outputs.push(url),
        Some(OutputsPatch::Set { index, url }) => {
            let len = next.outputs.len();
            let slot = next.outputs.get_mut(index).ok_or_else(|| {
                CoreError::Validation(format!(
                    "Output index {index} out of range (job has {len} outputs)"
                ))
            })?;
            *slot = url;
        }
        None => {}
    }

    if let Some(progress) = patch.progress {
        next.progress = progress;
    }

    // -- status --
    if let Some(status) = patch.status {
        match status {
            JobStatus::Completed => {
                next.error = None;
                next.completed_at = Some(now);
                next.manifest.active_prediction = None;
                next.progress = Progress::new("completed", 100, "Generation complete");
            }
            JobStatus::Failed => {
                let reason = patch
                    .error
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "generation failed".to_string());
                if !next.outputs.is_empty() {
                    let partial = std::mem::take(&mut next.outputs);
                    next.manifest
                        .extra
                        .insert(PARTIAL_OUTPUTS_KEY.into(), serde_json::json!(partial));
                }
                next.error = Some(reason.clone());
                next.completed_at = Some(now);
                next.manifest.active_prediction = None;
                next.progress = Progress::new("failed", next.progress.percent, reason);
            }
            _ => {
                if next.started_at.is_none() && status != JobStatus::Queued {
                    next.started_at = Some(now);
                }
            }
        }
        next.status = status;
    }

    next.check_invariants()?;
    next.updated_at = now;
    *job = next;
    Ok(())
}

/// Reopen a finished multi-scene job for regeneration of exactly one
/// scene.
///
/// This is the only transition out of a terminal state. The per-scene
/// videos are restored as the job's outputs (so `outputs[i]` is again
/// scene `i`), the error is cleared, and the job returns to `queued` with
/// `regenerating_scene_index` set.
pub fn reopen_for_scene(job: &mut Job, index: usize, now: Timestamp) -> Result<(), CoreError> {
    if !job.is_terminal() {
        return Err(CoreError::Conflict(format!(
            "Job {} is still {}; wait for it to finish before regenerating a scene",
            job.id, job.status
        )));
    }
    let total = job.manifest.scenes.len();
    if total == 0 {
        return Err(CoreError::Validation(format!(
            "Job {} has no scenes to regenerate",
            job.id
        )));
    }
    if index >= total {
        return Err(CoreError::Validation(format!(
            "Scene index {index} out of range (job has {total} scenes)"
        )));
    }
    let urls: Option<Vec<String>> = job
        .manifest
        .scenes
        .iter()
        .map(|s| s.video_url.clone())
        .collect();
    let urls = urls.ok_or_else(|| {
        CoreError::Conflict(format!(
            "Job {} has scenes without a video; it cannot be regenerated scene by scene",
            job.id
        ))
    })?;

    let mut next = job.clone();
    next.status = JobStatus::Queued;
    next.error = None;
    next.completed_at = None;
    next.outputs = urls;
    next.progress = Progress::new(
        "queued",
        0,
        format!("Waiting to regenerate scene {}", index + 1),
    );
    next.manifest.regenerating_scene_index = Some(index);
    next.manifest.current_scene_index = total;
    next.manifest.active_prediction = None;
    next.manifest.extra.remove(PARTIAL_OUTPUTS_KEY);
    next.manifest.scenes[index].status = SceneStatus::Pending;
    next.manifest.scenes[index].progress = 0;
    next.updated_at = now;

    next.check_invariants()?;
    *job = next;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
