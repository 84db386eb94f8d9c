//! Prediction poller.
//!
//! Turns a pollable external prediction into a local wait that is
//! cancellable (via the job's [`CancellationToken`]), bounded by an attempt
//! count and by a hard wall-clock deadline, and that stops as soon as the
//! job is finalized by another path.

use std::time::Duration;

use mediaflow_core::backoff::PollSchedule;
use mediaflow_core::job::Progress;
use mediaflow_core::patch::JobPatch;
use mediaflow_core::types::JobId;
use mediaflow_providers::{GenerationBackend, PredictionState};
use tokio_util::sync::CancellationToken;

use crate::registry::{JobRegistry, UpdateOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub schedule: PollSchedule,
    /// Status queries before giving up.
    pub max_attempts: u32,
    /// Hard ceiling on the whole wait, grace period included.
    pub deadline: Duration,
    /// Registry re-checks after a success that carried no output URL.
    pub grace_checks: u32,
    pub grace_interval: Duration,
}

/// How a poll ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded(Vec<String>),
    Failed(String),
    TimedOut,
    Cancelled,
    /// The job reached a terminal state through another path.
    Superseded,
}

/// Advisory progress reported while waiting. The percentage moves from
/// `start` towards `end` as attempts are used up.
#[derive(Debug, Clone)]
pub struct ProgressSpan {
    pub stage: &'static str,
    pub start: u8,
    pub end: u8,
    pub message: String,
}

impl ProgressSpan {
    pub fn new(stage: &'static str, start: u8, end: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            start,
            end,
            message: message.into(),
        }
    }

    fn at(&self, attempt: u32, max_attempts: u32) -> Progress {
        let span = u64::from(self.end.saturating_sub(self.start));
        let advanced =
            span * u64::from(attempt.min(max_attempts)) / u64::from(max_attempts.max(1));
        Progress::new(self.stage, self.start + advanced as u8, self.message.clone())
            .with_steps(attempt, max_attempts)
    }
}

/// One prediction to wait for.
pub struct PollTarget<'a> {
    pub job_id: JobId,
    pub backend: &'a dyn GenerationBackend,
    pub prediction_id: &'a str,
}

pub struct PredictionPoller<'a> {
    registry: &'a JobRegistry,
}

impl<'a> PredictionPoller<'a> {
    pub fn new(registry: &'a JobRegistry) -> Self {
        Self { registry }
    }

    /// Wait for `target` to reach a terminal state.
    pub async fn wait(
        &self,
        target: &PollTarget<'_>,
        config: &PollConfig,
        progress: &ProgressSpan,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        match tokio::time::timeout(
            config.deadline,
            self.poll_loop(target, config, progress, cancel),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    job_id = %target.job_id,
                    prediction_id = %target.prediction_id,
                    deadline_secs = config.deadline.as_secs(),
                    "Prediction exceeded its deadline",
                );
                PollOutcome::TimedOut
            }
        }
    }

    async fn poll_loop(
        &self,
        target: &PollTarget<'_>,
        config: &PollConfig,
        progress: &ProgressSpan,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let mut interval = config.schedule.initial_interval();

        for attempt in 1..=config.max_attempts {
            if let Some(stop) = self.should_stop(target.job_id, cancel).await {
                return stop;
            }

            tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep(interval) => {}
            }

            match target.backend.status(target.prediction_id).await {
                Ok(status) => match status.state {
                    PredictionState::Succeeded => {
                        let urls = status
                            .output
                            .as_ref()
                            .map(|output| target.backend.extract_urls(output))
                            .unwrap_or_default();
                        return self.resolve_success(target, urls, config, cancel).await;
                    }
                    PredictionState::Failed => {
                        return PollOutcome::Failed(
                            status.error.unwrap_or_else(|| "prediction failed".to_string()),
                        );
                    }
                    PredictionState::Canceled => {
                        if cancel.is_cancelled() {
                            return PollOutcome::Cancelled;
                        }
                        return PollOutcome::Failed(
                            "prediction was canceled by the provider".to_string(),
                        );
                    }
                    PredictionState::Starting | PredictionState::Processing => {
                        tracing::trace!(
                            job_id = %target.job_id,
                            prediction_id = %target.prediction_id,
                            attempt,
                            "Prediction still running",
                        );
                    }
                },
                Err(e) if e.is_content_policy() => return PollOutcome::Failed(e.to_string()),
                Err(e) => {
                    tracing::warn!(
                        job_id = %target.job_id,
                        prediction_id = %target.prediction_id,
                        attempt,
                        error = %e,
                        "Transient error querying prediction status",
                    );
                }
            }

            let patch = JobPatch::progress(progress.at(attempt, config.max_attempts));
            match self.registry.update_for_run(target.job_id, cancel, patch).await {
                Ok(UpdateOutcome::Stale(_)) => return self.stopped(cancel),
                Ok(UpdateOutcome::Applied(_)) => {}
                Err(e) => {
                    tracing::warn!(job_id = %target.job_id, error = %e, "Failed to record poll progress");
                }
            }

            interval = config.schedule.next_interval(interval);
        }

        tracing::warn!(
            job_id = %target.job_id,
            prediction_id = %target.prediction_id,
            max_attempts = config.max_attempts,
            "Prediction did not finish within the attempt budget",
        );
        PollOutcome::TimedOut
    }

    /// A success without an extractable URL may still be finished by an
    /// out-of-band persist step recording the URL on the job. Re-check the
    /// registry a few times before giving up.
    async fn resolve_success(
        &self,
        target: &PollTarget<'_>,
        urls: Vec<String>,
        config: &PollConfig,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        if !urls.is_empty() {
            return PollOutcome::Succeeded(urls);
        }

        for check in 0..=config.grace_checks {
            if check > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return PollOutcome::Cancelled,
                    _ = tokio::time::sleep(config.grace_interval) => {}
                }
            }
            match self.registry.get(target.job_id).await {
                Some(job) if job.is_terminal() => return self.stopped(cancel),
                Some(job) => {
                    if let Some(url) = job.manifest.persisted_output {
                        tracing::debug!(job_id = %target.job_id, check, "Using persisted output");
                        return PollOutcome::Succeeded(vec![url]);
                    }
                }
                None => return PollOutcome::Superseded,
            }
        }

        PollOutcome::Failed("prediction succeeded but returned no output URL".to_string())
    }

    async fn should_stop(&self, job_id: JobId, cancel: &CancellationToken) -> Option<PollOutcome> {
        if cancel.is_cancelled() {
            return Some(PollOutcome::Cancelled);
        }
        if self.registry.is_terminal(job_id).await {
            return Some(self.stopped(cancel));
        }
        None
    }

    fn stopped(&self, cancel: &CancellationToken) -> PollOutcome {
        if cancel.is_cancelled() {
            PollOutcome::Cancelled
        } else {
            PollOutcome::Superseded
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
