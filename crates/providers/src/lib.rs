//! Generation backend seam.
//!
//! External providers are black-box HTTP services that accept a request and
//! either answer immediately or hand back a pollable prediction. This crate
//! defines the [`GenerationBackend`] trait the pipeline drives, the error
//! classification the fallback chain relies on, per-provider
//! [`OutputAdapter`]s for result extraction, and an [`HttpBackend`]
//! speaking the predictions protocol.

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod output;

pub use backend::{
    BackendRequest, GenerationBackend, PredictionHandle, PredictionState, PredictionStatus,
    Submission,
};
pub use config::{BackendConfig, ConfigError, ProvidersConfig};
pub use error::BackendError;
pub use http::HttpBackend;
pub use output::OutputAdapter;
