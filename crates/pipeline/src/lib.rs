//! Asynchronous job orchestration for media generation.
//!
//! A [`Pipeline`] turns one [`GenerationOptions`](mediaflow_core::options::GenerationOptions)
//! request into external predictions, drives them to completion through the
//! [`PredictionPoller`], composes multi-step flows (reference image to
//! mesh, scene by scene video with stitching) and records every state
//! change in the [`JobRegistry`].

pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod pipeline;
pub mod poller;
pub mod registry;
pub mod scenes;

pub use config::{PipelineConfig, PollProfiles};
pub use error::{PipelineError, INTERNAL_ERROR_REASON};
pub use fallback::{BackendSet, FallbackChain};
pub use pipeline::{Pipeline, PipelineDeps};
pub use poller::{PollConfig, PollOutcome, PredictionPoller};
pub use registry::{CancelOutcome, JobRegistry, UpdateOutcome};
pub use scenes::SceneOrchestrator;
