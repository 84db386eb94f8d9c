//! Multi-scene video orchestration.
//!
//! Scenes render strictly in order. Scene `i + 1` is not dispatched until
//! scene `i` has been persisted and appended to the job's outputs, so
//! `outputs[i]` is always scene `i`. Once every scene is in, the clips are
//! handed to the stitcher and the stitched video replaces the per-scene
//! outputs. A job with a single scene completes without stitching.
//!
//! Regeneration renders only the flagged scene, replaces its output slot,
//! and stitches again.

use std::time::{Duration, Instant};

use mediaflow_cloud::StitchClip;
use mediaflow_core::error::CoreError;
use mediaflow_core::job::{BackendRole, Job, JobStatus, Progress};
use mediaflow_core::manifest::{PredictionRef, Scene, SceneStatus};
use mediaflow_core::patch::{JobPatch, OutputsPatch, ScenePatch};
use mediaflow_core::scene_split::split_prompt;
use mediaflow_core::types::JobId;
use mediaflow_providers::BackendRequest;
use tokio_util::sync::CancellationToken;

use crate::context::{take_resume, PipelineContext, PredictionStep};
use crate::error::PipelineError;
use crate::handlers::first_url;
use crate::poller::ProgressSpan;

/// Share of the progress bar spent rendering scenes; stitching takes the
/// rest.
const RENDER_SHARE: u32 = 90;

pub struct SceneOrchestrator<'a> {
    ctx: &'a PipelineContext,
    cancel: &'a CancellationToken,
}

impl<'a> SceneOrchestrator<'a> {
    pub fn new(ctx: &'a PipelineContext, cancel: &'a CancellationToken) -> Self {
        Self { ctx, cancel }
    }

    pub async fn run(&self, job: &Job) -> Result<(), PipelineError> {
        let job = if job.manifest.scenes.is_empty() {
            self.plan(job).await?
        } else {
            let message = match job.manifest.regenerating_scene_index {
                Some(index) => format!("Regenerating scene {}", index + 1),
                None => "Resuming scenes".to_string(),
            };
            self.ctx
                .advance(
                    job.id,
                    self.cancel,
                    JobPatch::stage(
                        JobStatus::Running,
                        Progress::new("generating", job.progress.percent, message),
                    ),
                )
                .await?
        };

        match job.manifest.regenerating_scene_index {
            Some(index) => self.regenerate(&job, index).await,
            None => self.render_remaining(&job).await,
        }
    }

    /// Build the scene list from explicit scenes or the prompt splitter.
    async fn plan(&self, job: &Job) -> Result<Job, PipelineError> {
        let options = &job.options;
        let prompts = match &options.scenes {
            Some(scenes) if !scenes.is_empty() => scenes.clone(),
            _ => split_prompt(&options.prompt),
        };
        let duration = options
            .duration_secs
            .unwrap_or(self.ctx.config.scene_duration_secs);
        let scenes: Vec<Scene> = prompts
            .into_iter()
            .enumerate()
            .map(|(order, prompt)| Scene::pending(order, prompt, duration))
            .collect();

        tracing::info!(job_id = %job.id, scenes = scenes.len(), "Planned video scenes");
        let total = scenes.len();
        self.ctx
            .advance(
                job.id,
                self.cancel,
                JobPatch::stage(
                    JobStatus::Running,
                    Progress::new("generating", 0, format!("Generating scene 1 of {total}"))
                        .with_steps(0, total as u32),
                )
                .with_scenes(scenes)
                .with_current_scene_index(0),
            )
            .await
    }

    async fn render_remaining(&self, job: &Job) -> Result<(), PipelineError> {
        let total = job.manifest.total_scenes();
        let first = job.manifest.current_scene_index;
        let mut resume = job.manifest.active_prediction.clone();
        let started = Instant::now();

        for index in first..total {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let resumed = take_resume(&mut resume, BackendRole::Video, Some(index));
            let url = self.render_scene(job, index, resumed).await?;

            let done = (index + 1) as u32;
            let mut progress = Progress::new(
                "generating",
                band_start(index + 1, total),
                format!("Scene {done} of {total} ready"),
            )
            .with_steps(done, total as u32);
            let rendered = index + 1 - first;
            if let Some(eta) = remaining_estimate(started.elapsed(), rendered, total - index - 1) {
                progress = progress.with_eta(eta);
            }
            self.ctx
                .advance(
                    job.id,
                    self.cancel,
                    JobPatch::progress(progress)
                        .with_scene(scene_done(index, url.clone()))
                        .with_outputs(OutputsPatch::Append { url })
                        .with_current_scene_index(index + 1)
                        .with_active_prediction(None),
                )
                .await?;
            tracing::info!(job_id = %job.id, scene_index = index, total, "Scene completed");
        }

        self.finish(job.id).await
    }

    async fn regenerate(&self, job: &Job, index: usize) -> Result<(), PipelineError> {
        let mut resume = job.manifest.active_prediction.clone();
        let resumed = take_resume(&mut resume, BackendRole::Video, Some(index));
        let url = self.render_scene(job, index, resumed).await?;

        self.ctx
            .advance(
                job.id,
                self.cancel,
                JobPatch::progress(Progress::new(
                    "generating",
                    RENDER_SHARE as u8,
                    format!("Scene {} regenerated", index + 1),
                ))
                .with_scene(scene_done(index, url.clone()))
                .with_outputs(OutputsPatch::Set { index, url })
                .with_active_prediction(None),
            )
            .await?;
        tracing::info!(job_id = %job.id, scene_index = index, "Scene regenerated");

        self.finish(job.id).await
    }

    /// Render one scene and persist its clip. Returns the stored URL.
    async fn render_scene(
        &self,
        job: &Job,
        index: usize,
        resume: Option<PredictionRef>,
    ) -> Result<String, PipelineError> {
        let total = job.manifest.total_scenes();
        let scene = job.manifest.scenes.get(index).ok_or_else(|| {
            CoreError::Validation(format!(
                "Scene index {index} out of range (job has {total} scenes)"
            ))
        })?;
        let message = format!("Generating scene {} of {total}", index + 1);

        self.ctx
            .advance(
                job.id,
                self.cancel,
                JobPatch::new().with_scene(ScenePatch {
                    index,
                    status: Some(SceneStatus::Running),
                    progress: Some(0),
                    video_url: None,
                }),
            )
            .await?;

        let request = BackendRequest::from_options(&job.options, BackendRole::Video)
            .with_prompt(scene.prompt.clone())
            .with_duration(scene.duration_secs);
        let urls = self
            .ctx
            .run_prediction(
                PredictionStep {
                    job_id: job.id,
                    role: BackendRole::Video,
                    request,
                    scene_index: Some(index),
                    progress: ProgressSpan::new(
                        "generating",
                        band_start(index, total),
                        band_start(index + 1, total),
                        message,
                    ),
                    cancel: self.cancel,
                },
                resume,
            )
            .await?;
        let source = first_url(urls, BackendRole::Video)?;

        // Regenerated clips never reuse the previous take's object name.
        let name = match job.manifest.regenerating_scene_index {
            Some(_) => format!("scene-{}-{}", index + 1, chrono::Utc::now().timestamp_millis()),
            None => format!("scene-{}", index + 1),
        };
        let stored = self.ctx.persist(job, &name, &source, "video/mp4").await?;
        Ok(stored.url)
    }

    /// Complete the job once every scene has an output: directly for a
    /// single scene, through the stitcher otherwise.
    async fn finish(&self, job_id: JobId) -> Result<(), PipelineError> {
        let job = self.ctx.registry.get(job_id).await.ok_or_else(|| {
            PipelineError::Core(CoreError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            })
        })?;
        let total = job.manifest.total_scenes();
        if job.outputs.len() < total {
            return Err(CoreError::Internal(format!(
                "{} of {total} scene outputs recorded",
                job.outputs.len()
            ))
            .into());
        }

        if total == 1 {
            self.ctx
                .advance(
                    job_id,
                    self.cancel,
                    JobPatch::completed_in_place().with_regenerating_scene_index(None),
                )
                .await?;
            tracing::info!(job_id = %job_id, "Single-scene video completed");
            return Ok(());
        }

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.ctx
            .advance(
                job_id,
                self.cancel,
                JobPatch::stage(
                    JobStatus::Encoding,
                    Progress::new("stitching", 92, format!("Stitching {total} scenes")),
                ),
            )
            .await?;

        let mut clips: Vec<StitchClip> = job
            .manifest
            .scenes
            .iter()
            .zip(&job.outputs)
            .map(|(scene, url)| StitchClip {
                url: url.clone(),
                duration_secs: scene.duration_secs,
                order: scene.order,
                prompt: scene.prompt.clone(),
            })
            .collect();
        clips.sort_by_key(|clip| clip.order);

        let stitched = self
            .ctx
            .stitcher
            .stitch(&clips)
            .await
            .map_err(|e| PipelineError::Stitch(e.to_string()))?;

        self.ctx
            .advance(
                job_id,
                self.cancel,
                JobPatch::completed(vec![stitched]).with_regenerating_scene_index(None),
            )
            .await?;
        tracing::info!(job_id = %job_id, scenes = total, "Stitched video completed");
        Ok(())
    }
}

fn scene_done(index: usize, url: String) -> ScenePatch {
    ScenePatch {
        index,
        status: Some(SceneStatus::Completed),
        progress: Some(100),
        video_url: Some(url),
    }
}

/// Seconds left to render `remaining` scenes at the pace of the `rendered`
/// scenes that took `elapsed`.
fn remaining_estimate(elapsed: Duration, rendered: usize, remaining: usize) -> Option<u64> {
    if rendered == 0 || remaining == 0 {
        return None;
    }
    let per_scene = elapsed.as_secs_f64() / rendered as f64;
    Some((per_scene * remaining as f64).ceil() as u64)
}

/// Job-level percentage at which scene `index` starts rendering.
fn band_start(index: usize, total: usize) -> u8 {
    (RENDER_SHARE * index as u32 / total.max(1) as u32) as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
