//! Collaborators shared by every job task, and the steps all handlers
//! compose: run one prediction through a fallback chain, then persist its
//! artifact.

use std::sync::Arc;
use std::time::Instant;

use mediaflow_cloud::{artifact_path, ArtifactFetcher, BlobStore, Stitcher};
use mediaflow_core::job::{BackendRole, Job};
use mediaflow_core::manifest::PredictionRef;
use mediaflow_core::patch::JobPatch;
use mediaflow_core::store::{FileRecorder, RetainedFile};
use mediaflow_core::types::JobId;
use mediaflow_providers::error::is_content_policy_message;
use mediaflow_providers::{BackendRequest, GenerationBackend, Submission};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::fallback::BackendSet;
use crate::poller::{PollOutcome, PollTarget, PredictionPoller, ProgressSpan};
use crate::registry::{JobRegistry, UpdateOutcome};

pub struct PipelineContext {
    pub registry: Arc<JobRegistry>,
    pub backends: BackendSet,
    pub blob_store: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub stitcher: Arc<dyn Stitcher>,
    pub recorder: Arc<dyn FileRecorder>,
    pub config: PipelineConfig,
}

/// One generation step inside a job.
pub struct PredictionStep<'a> {
    pub job_id: JobId,
    pub role: BackendRole,
    pub request: BackendRequest,
    /// Set when the prediction renders one scene of a multi-scene video.
    pub scene_index: Option<usize>,
    pub progress: ProgressSpan,
    pub cancel: &'a CancellationToken,
}

/// A persisted artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub url: String,
    pub content_type: String,
}

impl PipelineContext {
    /// Run `step` to completion and return the provider's output URLs.
    ///
    /// If `resume` names an in-flight prediction recorded before a restart
    /// (see [`take_resume`]), that prediction is polled instead of
    /// dispatching a new one.
    pub async fn run_prediction(
        &self,
        step: PredictionStep<'_>,
        resume: Option<PredictionRef>,
    ) -> Result<Vec<String>, PipelineError> {
        if step.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        if let Some(prediction) = resume {
            if let Some(backend) = self.backends.by_name(&prediction.backend) {
                tracing::info!(
                    job_id = %step.job_id,
                    backend = %prediction.backend,
                    prediction_id = %prediction.id,
                    "Resuming in-flight prediction",
                );
                return self.await_prediction(&step, backend.as_ref(), &prediction.id).await;
            }
            tracing::warn!(
                job_id = %step.job_id,
                backend = %prediction.backend,
                "Recorded backend is no longer configured, dispatching again",
            );
        }

        let request = step
            .request
            .clone()
            .with_webhook(self.config.webhook_url(step.job_id));
        let dispatch = self
            .backends
            .chain(step.role)
            .dispatch(&request, step.cancel)
            .await?;

        match dispatch.submission {
            Submission::Completed(output) => {
                let urls = dispatch.backend.extract_urls(&output);
                if urls.is_empty() {
                    return Err(PipelineError::BackendFailure {
                        backend: dispatch.backend.name().to_string(),
                        detail: "response contained no output URL".into(),
                    });
                }
                Ok(urls)
            }
            Submission::Pending(handle) => {
                let prediction = PredictionRef {
                    id: handle.id.clone(),
                    backend: handle.backend.clone(),
                    role: step.role,
                    scene_index: step.scene_index,
                    started_at: chrono::Utc::now(),
                };
                let recorded = self
                    .registry
                    .update_for_run(
                        step.job_id,
                        step.cancel,
                        JobPatch::new().with_active_prediction(Some(prediction)),
                    )
                    .await?;
                if let UpdateOutcome::Stale(_) = recorded {
                    // Cancelled while the submission was in flight: the
                    // canceller never saw this prediction.
                    abandon_prediction(step.job_id, dispatch.backend.as_ref(), &handle.id).await;
                    return Err(PipelineError::Superseded);
                }
                self.await_prediction(&step, dispatch.backend.as_ref(), &handle.id)
                    .await
            }
        }
    }

    async fn await_prediction(
        &self,
        step: &PredictionStep<'_>,
        backend: &dyn GenerationBackend,
        prediction_id: &str,
    ) -> Result<Vec<String>, PipelineError> {
        let started = Instant::now();
        let target = PollTarget {
            job_id: step.job_id,
            backend,
            prediction_id,
        };
        let outcome = PredictionPoller::new(&self.registry)
            .wait(
                &target,
                &self.config.poll_config(step.role),
                &step.progress,
                step.cancel,
            )
            .await;

        match outcome {
            PollOutcome::Succeeded(urls) => Ok(urls),
            PollOutcome::Failed(reason) if is_content_policy_message(&reason) => {
                Err(PipelineError::ContentPolicy(reason))
            }
            PollOutcome::Failed(reason) => Err(PipelineError::BackendFailure {
                backend: backend.name().to_string(),
                detail: reason,
            }),
            PollOutcome::TimedOut => Err(PipelineError::Timeout {
                what: format!("{} prediction {prediction_id}", step.role),
                elapsed: started.elapsed(),
            }),
            PollOutcome::Cancelled => Err(PipelineError::Cancelled),
            PollOutcome::Superseded => Err(PipelineError::Superseded),
        }
    }

    /// Download `source_url` and store it under the job's artifact prefix.
    pub async fn persist(
        &self,
        job: &Job,
        name: &str,
        source_url: &str,
        fallback_content_type: &str,
    ) -> Result<StoredArtifact, PipelineError> {
        let artifact = self
            .fetcher
            .fetch(source_url, fallback_content_type)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;
        let path = artifact_path(job.options.media_type, job.id, name, &artifact.content_type);
        let url = self
            .blob_store
            .upload(&path, artifact.bytes, &artifact.content_type)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        tracing::debug!(job_id = %job.id, path = %path, "Stored artifact");
        Ok(StoredArtifact {
            url,
            content_type: artifact.content_type,
        })
    }

    /// Record a stored artifact for retention. Failures are logged only.
    pub async fn record_retention(&self, job: &Job, artifact: &StoredArtifact) {
        let file = RetainedFile {
            job_id: job.id,
            user_id: job.options.user_id.clone(),
            media_type: job.options.media_type,
            url: artifact.url.clone(),
            content_type: artifact.content_type.clone(),
        };
        if let Err(e) = self.recorder.record_file(&file).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to record retained file");
        }
    }

    /// Apply `patch` for the run owning `cancel`. A lost race with a
    /// terminal state or a newer run is [`PipelineError::Superseded`].
    pub async fn advance(
        &self,
        job_id: JobId,
        cancel: &CancellationToken,
        patch: JobPatch,
    ) -> Result<Job, PipelineError> {
        self.registry
            .update_for_run(job_id, cancel, patch)
            .await?
            .applied()
    }
}

/// Best-effort cancel of a prediction nobody will poll.
async fn abandon_prediction(job_id: JobId, backend: &dyn GenerationBackend, prediction_id: &str) {
    match backend.cancel(prediction_id).await {
        Ok(()) => tracing::info!(
            job_id = %job_id,
            backend = %backend.name(),
            prediction_id = %prediction_id,
            "Cancelled prediction accepted after the job stopped",
        ),
        Err(e) => tracing::warn!(
            job_id = %job_id,
            backend = %backend.name(),
            prediction_id = %prediction_id,
            error = %e,
            "Failed to cancel orphaned prediction",
        ),
    }
}

/// Take the recorded in-flight prediction out of `slot` if it belongs to
/// the step about to run. A recorded prediction is resumed at most once.
pub fn take_resume(
    slot: &mut Option<PredictionRef>,
    role: BackendRole,
    scene_index: Option<usize>,
) -> Option<PredictionRef> {
    let matches = slot
        .as_ref()
        .is_some_and(|p| p.role == role && p.scene_index == scene_index);
    if matches {
        slot.take()
    } else {
        None
    }
}
