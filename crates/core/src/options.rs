//! Generation request options and their validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::job::MediaType;

// ---------------------------------------------------------------------------
// Defaults and limits
// ---------------------------------------------------------------------------

/// Default output width / height in pixels.
pub const DEFAULT_DIMENSION: u32 = 1024;

/// Maximum number of explicit scenes in one video job.
pub const MAX_SCENES: usize = 8;

fn default_dimension() -> u32 {
    DEFAULT_DIMENSION
}

// ---------------------------------------------------------------------------
// GenerationOptions
// ---------------------------------------------------------------------------

/// Immutable generation request attached to a job at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GenerationOptions {
    #[serde(rename = "type")]
    pub media_type: MediaType,

    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000))]
    pub negative_prompt: Option<String>,

    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 4096))]
    pub width: u32,

    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 4096))]
    pub height: u32,

    /// Per-scene duration for video jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1.0, max = 60.0))]
    pub duration_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 60))]
    pub fps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 150))]
    pub steps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 30.0))]
    pub guidance_scale: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 4))]
    pub num_outputs: Option<u32>,

    /// Reference images. For 3D / CAD jobs the first one replaces the
    /// reference-image generation stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,

    /// Explicit scene prompts for a multi-scene video job. When absent the
    /// prompt is split automatically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenes: Option<Vec<String>>,

    /// Generate a video as one prediction with no scene orchestration.
    #[serde(default)]
    pub single_shot: bool,

    /// Owner of the job, used for retention records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl GenerationOptions {
    /// Options with only a media type and prompt; everything else default.
    pub fn new(media_type: MediaType, prompt: impl Into<String>) -> Self {
        Self {
            media_type,
            prompt: prompt.into(),
            negative_prompt: None,
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
            duration_secs: None,
            fps: None,
            seed: None,
            steps: None,
            guidance_scale: None,
            num_outputs: None,
            reference_images: Vec::new(),
            scenes: None,
            single_shot: false,
            user_id: None,
        }
    }

    /// Whether the requested dimensions differ from the provider default,
    /// which is what triggers the enhancement sub-call for images.
    pub fn has_custom_dimensions(&self, default_width: u32, default_height: u32) -> bool {
        self.width != default_width || self.height != default_height
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a request before a job is created.
///
/// Combines the declarative field limits with the cross-field rules the
/// derive cannot express.
pub fn validate_options(options: &GenerationOptions) -> Result<(), CoreError> {
    options
        .validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    if options.prompt.trim().is_empty() {
        return Err(CoreError::Validation("Prompt must not be blank".into()));
    }

    if let Some(scenes) = &options.scenes {
        if options.media_type != MediaType::Video {
            return Err(CoreError::Validation(
                "Explicit scenes are only supported for video jobs".into(),
            ));
        }
        if scenes.is_empty() || scenes.len() > MAX_SCENES {
            return Err(CoreError::Validation(format!(
                "A video job must have between 1 and {MAX_SCENES} scenes, got {}",
                scenes.len()
            )));
        }
        if let Some(idx) = scenes.iter().position(|s| s.trim().is_empty()) {
            return Err(CoreError::Validation(format!(
                "Scene {idx} has a blank prompt"
            )));
        }
        if options.single_shot && scenes.len() > 1 {
            return Err(CoreError::Validation(
                "A single-shot video cannot carry more than one scene".into(),
            ));
        }
    }

    if options.single_shot && options.media_type != MediaType::Video {
        return Err(CoreError::Validation(
            "single_shot is only meaningful for video jobs".into(),
        ));
    }

    for url in &options.reference_images {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(CoreError::Validation(format!(
                "Reference image '{url}' must be an http(s) URL"
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
