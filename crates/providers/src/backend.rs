//! The [`GenerationBackend`] trait and the request/prediction types it
//! exchanges with the pipeline.

use async_trait::async_trait;
use mediaflow_core::job::BackendRole;
use mediaflow_core::options::GenerationOptions;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Structured request sent to a backend. Optional fields are omitted from
/// the wire payload when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(rename = "num_inference_steps", skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_outputs: Option<u32>,
    /// Input image for enhancement and mesh conversion.
    #[serde(rename = "image", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Completion callback URL, passed through to providers that support it.
    #[serde(skip)]
    pub webhook_url: Option<String>,
}

impl BackendRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Map the user's generation options onto a request, carrying only the
    /// parameters relevant to `role`.
    pub fn from_options(options: &GenerationOptions, role: BackendRole) -> Self {
        let mut request = Self::new(options.prompt.clone());
        request.negative_prompt = options.negative_prompt.clone();
        request.seed = options.seed;
        match role {
            BackendRole::Image => {
                request.width = Some(options.width);
                request.height = Some(options.height);
                request.steps = options.steps;
                request.guidance_scale = options.guidance_scale;
                request.num_outputs = options.num_outputs;
            }
            BackendRole::Video => {
                request.width = Some(options.width);
                request.height = Some(options.height);
                request.duration_secs = options.duration_secs;
                request.fps = options.fps;
                request.guidance_scale = options.guidance_scale;
            }
            BackendRole::Enhance => {
                request.width = Some(options.width);
                request.height = Some(options.height);
            }
            BackendRole::Mesh | BackendRole::CadMesh => {
                request.steps = options.steps;
            }
        }
        request
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_webhook(mut self, url: Option<String>) -> Self {
        self.webhook_url = url;
        self
    }
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// Opaque external prediction id plus the backend that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionHandle {
    pub id: String,
    pub backend: String,
    pub role: BackendRole,
}

/// Provider-reported prediction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionState {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionState {
    /// Parse a provider status string. Unknown values are treated as still
    /// in progress so a new intermediate status never aborts a poll.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "starting" | "queued" => Self::Starting,
            "succeeded" | "success" | "completed" => Self::Succeeded,
            "failed" | "error" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Processing,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// One observation of a prediction's state.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionStatus {
    pub state: PredictionState,
    /// Raw provider output, present once the prediction has succeeded.
    pub output: Option<serde_json::Value>,
    /// Provider error message for failed predictions.
    pub error: Option<String>,
}

impl PredictionStatus {
    pub fn in_progress(state: PredictionState) -> Self {
        Self {
            state,
            output: None,
            error: None,
        }
    }

    pub fn succeeded(output: serde_json::Value) -> Self {
        Self {
            state: PredictionState::Succeeded,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: PredictionState::Failed,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Result of handing a request to a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The backend answered synchronously with its raw output.
    Completed(serde_json::Value),
    /// The backend accepted the request; poll the handle for the result.
    Pending(PredictionHandle),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A named external generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Unique name, used in logs, manifests and cancellation lookups.
    fn name(&self) -> &str;

    fn role(&self) -> BackendRole;

    /// Start a generation.
    async fn generate(&self, request: &BackendRequest) -> Result<Submission, BackendError>;

    /// Query the state of a previously accepted prediction.
    async fn status(&self, prediction_id: &str) -> Result<PredictionStatus, BackendError>;

    /// Request cancellation of a running prediction.
    async fn cancel(&self, prediction_id: &str) -> Result<(), BackendError>;

    /// Extract result URLs from this backend's raw output.
    fn extract_urls(&self, output: &serde_json::Value) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
