//! The pipeline facade: submit, inspect, cancel and regenerate jobs.
//!
//! Every job runs in its own task under a supervisor; a panic
//! inside a handler still finalizes the job as failed.

use std::sync::Arc;

use mediaflow_cloud::{ArtifactFetcher, BlobStore, Stitcher};
use mediaflow_core::error::CoreError;
use mediaflow_core::job::{Job, MediaType};
use mediaflow_core::manifest::PredictionRef;
use mediaflow_core::options::{validate_options, GenerationOptions};
use mediaflow_core::patch::JobPatch;
use mediaflow_core::store::FileRecorder;
use mediaflow_core::types::JobId;
use mediaflow_events::UpdateNotifier;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::PipelineConfig;
use crate::context::PipelineContext;
use crate::error::{PipelineError, INTERNAL_ERROR_REASON};
use crate::fallback::BackendSet;
use crate::handlers::{image, mesh, video};
use crate::registry::{CancelOutcome, JobRegistry, UpdateOutcome};
use crate::scenes::SceneOrchestrator;

/// External collaborators the pipeline is built from.
pub struct PipelineDeps {
    pub registry: Arc<JobRegistry>,
    pub backends: BackendSet,
    pub blob_store: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub stitcher: Arc<dyn Stitcher>,
    pub recorder: Arc<dyn FileRecorder>,
}

#[derive(Clone)]
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
    tasks: TaskTracker,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        let ctx = PipelineContext {
            registry: deps.registry,
            backends: deps.backends,
            blob_store: deps.blob_store,
            fetcher: deps.fetcher,
            stitcher: deps.stitcher,
            recorder: deps.recorder,
            config,
        };
        Self {
            ctx: Arc::new(ctx),
            tasks: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.ctx.registry
    }

    pub fn notifier(&self) -> &Arc<UpdateNotifier> {
        self.ctx.registry.notifier()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    /// Validate `options`, create a queued job and start it in the
    /// background. Returns as soon as the job is recorded.
    pub async fn submit(&self, options: GenerationOptions) -> Result<Job, PipelineError> {
        validate_options(&options).map_err(|e| match e {
            CoreError::Validation(detail) => PipelineError::Validation(detail),
            other => other.into(),
        })?;

        let job = self.ctx.registry.insert(Job::new(options)).await?;
        tracing::info!(
            job_id = %job.id,
            media_type = %job.options.media_type,
            "Job submitted",
        );
        self.start(job.clone()).await?;
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.ctx.registry.get(id).await
    }

    pub async fn list(&self) -> Vec<Job> {
        self.ctx.registry.list().await
    }

    /// Cancel a job. Finished jobs are returned unchanged. The active
    /// external prediction, if any, is cancelled on a best-effort basis.
    pub async fn cancel(&self, id: JobId) -> Result<Job, PipelineError> {
        match self.ctx.registry.cancel(id).await? {
            CancelOutcome::Cancelled {
                job,
                active_prediction,
            } => {
                if let Some(prediction) = active_prediction {
                    self.cancel_external(id, &prediction).await;
                }
                Ok(job)
            }
            CancelOutcome::AlreadyFinished(job) => {
                tracing::debug!(job_id = %id, status = %job.status, "Cancel ignored, job already finished");
                Ok(job)
            }
        }
    }

    /// Reopen a finished multi-scene job and regenerate scene `index`.
    pub async fn regenerate_scene(&self, id: JobId, index: usize) -> Result<Job, PipelineError> {
        let job = self.ctx.registry.reopen_for_scene(id, index).await?;
        tracing::info!(job_id = %id, scene_index = index, "Scene regeneration requested");
        self.start(job.clone()).await?;
        Ok(job)
    }

    /// Record the final artifact URL for a job's active prediction, as
    /// reported by a provider webhook or an out-of-band persist step.
    pub async fn record_persisted_output(
        &self,
        id: JobId,
        url: String,
    ) -> Result<Job, PipelineError> {
        match self
            .ctx
            .registry
            .update(id, JobPatch::new().with_persisted_output(url))
            .await?
        {
            UpdateOutcome::Applied(job) => Ok(job),
            UpdateOutcome::Stale(job) => Err(CoreError::Conflict(format!(
                "Job {} is already {}",
                job.id, job.status
            ))
            .into()),
        }
    }

    /// Re-spawn every unfinished job found in the store. Returns how many
    /// jobs were resumed.
    pub async fn resume_unfinished(&self) -> Result<usize, PipelineError> {
        let Some(store) = self.ctx.registry.store() else {
            return Ok(0);
        };
        let jobs = store
            .list_unfinished()
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let count = jobs.len();
        for job in jobs {
            tracing::info!(
                job_id = %job.id,
                status = %job.status,
                active_prediction = job.manifest.active_prediction.is_some(),
                "Resuming unfinished job",
            );
            self.ctx.registry.restore(job.clone()).await;
            self.start(job).await?;
        }
        Ok(count)
    }

    /// Stop every job task and wait for them to exit. Job state is left
    /// untouched; unfinished jobs resume on the next start.
    pub async fn shutdown(&self) {
        self.ctx.registry.shutdown();
        self.tasks.close();
        self.tasks.wait().await;
    }

    // ---- private helpers ----

    async fn start(&self, job: Job) -> Result<(), PipelineError> {
        let cancel = self.ctx.registry.cancel_token(job.id).await.ok_or_else(|| {
            PipelineError::Core(CoreError::NotFound {
                entity: "job",
                id: job.id.to_string(),
            })
        })?;
        let ctx = Arc::clone(&self.ctx);

        self.tasks.spawn(async move {
            let job_id = job.id;
            let worker = tokio::spawn(run_job(Arc::clone(&ctx), job, cancel.clone()));
            if let Err(e) = worker.await {
                if e.is_panic() {
                    tracing::error!(job_id = %job_id, "Job task panicked");
                    fail(&ctx, job_id, &cancel, INTERNAL_ERROR_REASON.to_string()).await;
                }
            }
        });
        Ok(())
    }

    async fn cancel_external(&self, job_id: JobId, prediction: &PredictionRef) {
        let Some(backend) = self.ctx.backends.by_name(&prediction.backend) else {
            tracing::warn!(
                job_id = %job_id,
                backend = %prediction.backend,
                "Cannot cancel prediction, backend is not configured",
            );
            return;
        };
        match backend.cancel(&prediction.id).await {
            Ok(()) => tracing::info!(
                job_id = %job_id,
                prediction_id = %prediction.id,
                "External prediction cancelled",
            ),
            Err(e) => tracing::warn!(
                job_id = %job_id,
                prediction_id = %prediction.id,
                error = %e,
                "Failed to cancel external prediction",
            ),
        }
    }
}

/// Route a job to its handler and record the outcome.
async fn run_job(ctx: Arc<PipelineContext>, job: Job, cancel: CancellationToken) {
    let job_id = job.id;
    let result = match job.options.media_type {
        MediaType::Image => image::run(&ctx, &job, &cancel).await,
        MediaType::Video if job.options.single_shot => video::run(&ctx, &job, &cancel).await,
        MediaType::Video => SceneOrchestrator::new(&ctx, &cancel).run(&job).await,
        MediaType::Mesh3d | MediaType::Cad => mesh::run(&ctx, &job, &cancel).await,
    };

    match result {
        Ok(()) => {}
        Err(e) if e.is_silent() => {
            tracing::debug!(job_id = %job_id, reason = %e, "Job task stopped");
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Job failed");
            fail(&ctx, job_id, &cancel, e.user_message()).await;
        }
    }
}

async fn fail(ctx: &PipelineContext, job_id: JobId, cancel: &CancellationToken, reason: String) {
    let patch = JobPatch::failed(reason).with_regenerating_scene_index(None);
    match ctx.registry.update_for_run(job_id, cancel, patch).await {
        Ok(UpdateOutcome::Applied(_)) => {}
        Ok(UpdateOutcome::Stale(job)) => {
            tracing::debug!(job_id = %job_id, status = %job.status, "Job finished or taken over, failure not recorded");
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record job failure");
        }
    }
}
