//! Single-shot video: one prediction, then download and persist.

use mediaflow_core::job::{BackendRole, Job, JobStatus, Progress};
use mediaflow_core::patch::JobPatch;
use mediaflow_providers::BackendRequest;
use tokio_util::sync::CancellationToken;

use super::first_url;
use crate::context::{take_resume, PipelineContext, PredictionStep};
use crate::error::PipelineError;
use crate::poller::ProgressSpan;

pub async fn run(
    ctx: &PipelineContext,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let mut resume = job.manifest.active_prediction.clone();

    ctx.advance(
        job.id,
        cancel,
        JobPatch::stage(
            JobStatus::Running,
            Progress::new("generating", 5, "Generating video"),
        ),
    )
    .await?;

    let mut request = BackendRequest::from_options(&job.options, BackendRole::Video);
    if request.duration_secs.is_none() {
        request = request.with_duration(ctx.config.scene_duration_secs);
    }
    let urls = ctx
        .run_prediction(
            PredictionStep {
                job_id: job.id,
                role: BackendRole::Video,
                request,
                scene_index: None,
                progress: ProgressSpan::new("generating", 10, 85, "Generating video"),
                cancel,
            },
            take_resume(&mut resume, BackendRole::Video, None),
        )
        .await?;
    let source = first_url(urls, BackendRole::Video)?;

    ctx.advance(
        job.id,
        cancel,
        JobPatch::stage(
            JobStatus::Encoding,
            Progress::new("encoding", 90, "Saving video"),
        ),
    )
    .await?;
    let stored = ctx.persist(job, "video", &source, "video/mp4").await?;

    ctx.advance(job.id, cancel, JobPatch::completed(vec![stored.url])).await?;
    tracing::info!(job_id = %job.id, "Video job completed");
    Ok(())
}
