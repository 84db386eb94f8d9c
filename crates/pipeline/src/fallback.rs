//! Model fallback chains.
//!
//! A [`BackendSet`] groups the configured backends by [`BackendRole`] in
//! priority order. [`FallbackChain::dispatch`] walks one role's chain until
//! a backend accepts the request. Quota, rate-limit, server and validation
//! failures advance to the next backend; a content-policy rejection is
//! surfaced immediately. No backend is called twice in one dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use mediaflow_core::job::BackendRole;
use mediaflow_providers::{BackendRequest, GenerationBackend, Submission};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Configured backends grouped by role.
#[derive(Clone, Default)]
pub struct BackendSet {
    chains: HashMap<BackendRole, Vec<Arc<dyn GenerationBackend>>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `backends` by role, keeping their relative order.
    pub fn from_backends(backends: impl IntoIterator<Item = Arc<dyn GenerationBackend>>) -> Self {
        backends.into_iter().fold(Self::new(), Self::with_backend)
    }

    /// Append a backend to the end of its role's chain.
    pub fn with_backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.chains.entry(backend.role()).or_default().push(backend);
        self
    }

    pub fn chain(&self, role: BackendRole) -> FallbackChain<'_> {
        FallbackChain {
            role,
            backends: self.chains.get(&role).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    /// Look a backend up by name, e.g. to cancel or resume a prediction
    /// recorded in a job manifest.
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn GenerationBackend>> {
        self.chains
            .values()
            .flatten()
            .find(|b| b.name() == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.chains.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A backend that accepted a request, with its answer.
pub struct Dispatch {
    pub backend: Arc<dyn GenerationBackend>,
    pub submission: Submission,
}

/// One role's ordered list of interchangeable backends.
pub struct FallbackChain<'a> {
    role: BackendRole,
    backends: &'a [Arc<dyn GenerationBackend>],
}

impl FallbackChain<'_> {
    pub fn role(&self) -> BackendRole {
        self.role
    }

    pub async fn dispatch(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<Dispatch, PipelineError> {
        let mut attempted = Vec::with_capacity(self.backends.len());
        let mut last: Option<PipelineError> = None;

        for backend in self.backends {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            attempted.push(backend.name().to_string());

            match backend.generate(request).await {
                Ok(submission) => {
                    tracing::info!(
                        role = %self.role,
                        backend = %backend.name(),
                        attempt = attempted.len(),
                        "Backend accepted request",
                    );
                    return Ok(Dispatch {
                        backend: Arc::clone(backend),
                        submission,
                    });
                }
                Err(e) if !e.advances_chain() => {
                    tracing::warn!(
                        role = %self.role,
                        backend = %backend.name(),
                        error = %e,
                        "Backend rejected request on content policy",
                    );
                    return Err(PipelineError::from_backend(backend.name(), e));
                }
                Err(e) => {
                    tracing::warn!(
                        role = %self.role,
                        backend = %backend.name(),
                        error = %e,
                        "Backend unavailable, trying next",
                    );
                    last = Some(PipelineError::from_backend(backend.name(), e));
                }
            }
        }

        let last = last.unwrap_or_else(|| {
            PipelineError::Validation(format!("no {} backends are configured", self.role))
        });
        tracing::error!(role = %self.role, attempted = ?attempted, "All backends unavailable");
        Err(PipelineError::AllBackendsUnavailable {
            role: self.role,
            attempted,
            last: Box::new(last),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
