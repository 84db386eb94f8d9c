//! Image-to-3D and image-to-CAD.
//!
//! Stage 1 produces a reference image (or takes the caller's), stage 2
//! hands it to a mesh-conversion backend. The reference image is kept in
//! the manifest under [`REFERENCE_IMAGE_KEY`]; a resumed job reuses it.
//! It is never exposed as a job output.

use mediaflow_core::error::CoreError;
use mediaflow_core::job::{BackendRole, Job, JobStatus, MediaType, Progress};
use mediaflow_core::manifest::PredictionRef;
use mediaflow_core::patch::JobPatch;
use mediaflow_providers::BackendRequest;
use tokio_util::sync::CancellationToken;

use super::first_url;
use crate::context::{take_resume, PipelineContext, PredictionStep};
use crate::error::PipelineError;
use crate::poller::ProgressSpan;

pub const REFERENCE_IMAGE_KEY: &str = "reference_image";

const MESH_CONTENT_TYPE: &str = "model/gltf-binary";

/// Backend role performing the conversion for a media type.
pub fn mesh_role(media_type: MediaType) -> Result<BackendRole, PipelineError> {
    match media_type {
        MediaType::Mesh3d => Ok(BackendRole::Mesh),
        MediaType::Cad => Ok(BackendRole::CadMesh),
        other => Err(CoreError::Internal(format!("{other} jobs have no mesh stage")).into()),
    }
}

/// Prompt for the stage-1 reference image.
pub fn reference_prompt(media_type: MediaType, prompt: &str) -> String {
    let prompt = prompt.trim();
    match media_type {
        MediaType::Cad => format!(
            "{prompt}, technical CAD drawing, isometric view, precise clean edges, \
             neutral grey material on a plain white background"
        ),
        _ => format!(
            "{prompt}, single object centered on a clean white background, \
             soft studio lighting, no shadows, full object in frame"
        ),
    }
}

pub async fn run(
    ctx: &PipelineContext,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let role = mesh_role(job.options.media_type)?;
    let mut resume = job.manifest.active_prediction.clone();

    ctx.advance(
        job.id,
        cancel,
        JobPatch::stage(
            JobStatus::Running,
            Progress::new("reference", 5, "Preparing reference image"),
        ),
    )
    .await?;

    let reference = reference_image(ctx, job, &mut resume, cancel).await?;

    let request = BackendRequest::from_options(&job.options, role).with_image(reference);
    let urls = ctx
        .run_prediction(
            PredictionStep {
                job_id: job.id,
                role,
                request,
                scene_index: None,
                progress: ProgressSpan::new("meshing", 40, 90, "Converting to mesh"),
                cancel,
            },
            take_resume(&mut resume, role, None),
        )
        .await?;
    let source = first_url(urls, role)?;

    ctx.advance(
        job.id,
        cancel,
        JobPatch::stage(
            JobStatus::Encoding,
            Progress::new("encoding", 92, "Saving mesh"),
        ),
    )
    .await?;
    let stored = ctx.persist(job, "mesh", &source, MESH_CONTENT_TYPE).await?;
    ctx.record_retention(job, &stored).await;

    ctx.advance(job.id, cancel, JobPatch::completed(vec![stored.url])).await?;
    tracing::info!(job_id = %job.id, media_type = %job.options.media_type, "Mesh job completed");
    Ok(())
}

/// The caller's first reference image, the one recorded by an earlier run,
/// or a freshly generated one.
async fn reference_image(
    ctx: &PipelineContext,
    job: &Job,
    resume: &mut Option<PredictionRef>,
    cancel: &CancellationToken,
) -> Result<String, PipelineError> {
    if let Some(url) = job.options.reference_images.first() {
        return Ok(url.clone());
    }
    if let Some(url) = job
        .manifest
        .extra
        .get(REFERENCE_IMAGE_KEY)
        .and_then(serde_json::Value::as_str)
    {
        tracing::debug!(job_id = %job.id, "Reusing recorded reference image");
        return Ok(url.to_string());
    }

    let mut request = BackendRequest::from_options(&job.options, BackendRole::Image)
        .with_prompt(reference_prompt(job.options.media_type, &job.options.prompt));
    request.num_outputs = Some(1);

    let urls = ctx
        .run_prediction(
            PredictionStep {
                job_id: job.id,
                role: BackendRole::Image,
                request,
                scene_index: None,
                progress: ProgressSpan::new("reference", 5, 35, "Generating reference image"),
                cancel,
            },
            take_resume(resume, BackendRole::Image, None),
        )
        .await?;
    let url = first_url(urls, BackendRole::Image)?;

    ctx.advance(
        job.id,
        cancel,
        JobPatch::progress(Progress::new("reference", 40, "Reference image ready"))
            .with_active_prediction(None)
            .with_extra(REFERENCE_IMAGE_KEY, serde_json::json!(url)),
    )
    .await?;
    Ok(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_by_media_type() {
        assert_eq!(mesh_role(MediaType::Mesh3d).unwrap(), BackendRole::Mesh);
        assert_eq!(mesh_role(MediaType::Cad).unwrap(), BackendRole::CadMesh);
        assert!(mesh_role(MediaType::Image).is_err());
    }

    #[test]
    fn reference_prompts_differ_by_type() {
        let mesh = reference_prompt(MediaType::Mesh3d, "a wooden chair ");
        let cad = reference_prompt(MediaType::Cad, "a wooden chair");
        assert!(mesh.starts_with("a wooden chair, "));
        assert!(mesh.contains("clean white background"));
        assert!(cad.contains("technical CAD drawing"));
    }
}
