//! Image pipeline: generate, optionally enhance to the requested size,
//! then persist every output.

use mediaflow_core::job::{BackendRole, Job, JobStatus, Progress};
use mediaflow_core::manifest::PredictionRef;
use mediaflow_core::patch::JobPatch;
use mediaflow_providers::BackendRequest;
use tokio_util::sync::CancellationToken;

use crate::context::{take_resume, PipelineContext, PredictionStep};
use crate::error::PipelineError;
use crate::poller::ProgressSpan;

pub async fn run(
    ctx: &PipelineContext,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let options = &job.options;
    let mut resume = job.manifest.active_prediction.clone();

    ctx.advance(
        job.id,
        cancel,
        JobPatch::stage(
            JobStatus::Running,
            Progress::new("generating", 5, "Generating image"),
        ),
    )
    .await?;

    let generated = ctx
        .run_prediction(
            PredictionStep {
                job_id: job.id,
                role: BackendRole::Image,
                request: BackendRequest::from_options(options, BackendRole::Image),
                scene_index: None,
                progress: ProgressSpan::new("generating", 10, 60, "Generating image"),
                cancel,
            },
            take_resume(&mut resume, BackendRole::Image, None),
        )
        .await?;

    let urls = if options.has_custom_dimensions(ctx.config.default_width, ctx.config.default_height)
    {
        ctx.advance(
            job.id,
            cancel,
            JobPatch::stage(
                JobStatus::Upscaling,
                Progress::new(
                    "upscaling",
                    60,
                    format!("Enhancing to {}x{}", options.width, options.height),
                ),
            ),
        )
        .await?;

        let mut enhanced = Vec::with_capacity(generated.len());
        for url in generated {
            let resume = take_resume(&mut resume, BackendRole::Enhance, None);
            enhanced.push(enhance(ctx, job, url, resume, cancel).await?);
        }
        enhanced
    } else {
        generated
    };

    ctx.advance(
        job.id,
        cancel,
        JobPatch::progress(Progress::new("saving", 85, "Saving images")),
    )
    .await?;

    let mut outputs = Vec::with_capacity(urls.len());
    for (i, url) in urls.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        match ctx.persist(job, &format!("image-{}", i + 1), &url, "image/png").await {
            Ok(stored) => outputs.push(stored.url),
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    output = i,
                    error = %e,
                    "Failed to persist image, keeping provider URL",
                );
                outputs.push(url);
            }
        }
    }

    ctx.advance(job.id, cancel, JobPatch::completed(outputs)).await?;
    tracing::info!(job_id = %job.id, "Image job completed");
    Ok(())
}

/// Enhance one image. A failed enhancement keeps the original image.
async fn enhance(
    ctx: &PipelineContext,
    job: &Job,
    url: String,
    resume: Option<PredictionRef>,
    cancel: &CancellationToken,
) -> Result<String, PipelineError> {
    let request =
        BackendRequest::from_options(&job.options, BackendRole::Enhance).with_image(url.clone());
    let step = PredictionStep {
        job_id: job.id,
        role: BackendRole::Enhance,
        request,
        scene_index: None,
        progress: ProgressSpan::new("upscaling", 60, 80, "Enhancing image"),
        cancel,
    };

    match ctx.run_prediction(step, resume).await {
        Ok(enhanced) => Ok(enhanced.into_iter().next().unwrap_or(url)),
        Err(e) if e.is_silent() => Err(e),
        Err(e) => {
            tracing::warn!(
                job_id = %job.id,
                error = %e,
                "Enhancement failed, keeping original image",
            );
            Ok(url)
        }
    }
}
