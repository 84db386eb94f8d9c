//! Job registry: single source of truth for job state.
//!
//! Every mutation goes through [`JobRegistry::update`], which merges a
//! [`JobPatch`] under a per-job lock, writes the result through the
//! optional [`JobStore`], and only then notifies subscribers, exactly once
//! per applied patch. Terminal states are sticky: a patch against a
//! finished job is reported as [`UpdateOutcome::Stale`] and changes
//! nothing.

use std::collections::HashMap;
use std::sync::Arc;

use mediaflow_core::error::CoreError;
use mediaflow_core::job::{Job, JobUpdate, CANCELLED_REASON};
use mediaflow_core::manifest::PredictionRef;
use mediaflow_core::patch::{apply_patch, reopen_for_scene, JobPatch};
use mediaflow_core::store::JobStore;
use mediaflow_core::types::JobId;
use mediaflow_events::UpdateNotifier;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

struct Entry {
    job: Job,
    cancel: CancellationToken,
}

/// Result of [`JobRegistry::update`].
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// The patch was applied; carries the new state.
    Applied(Job),
    /// The job had already reached a terminal state; carries it unchanged.
    Stale(Job),
}

impl UpdateOutcome {
    pub fn job(&self) -> &Job {
        match self {
            Self::Applied(job) | Self::Stale(job) => job,
        }
    }

    /// The applied job, or [`PipelineError::Superseded`] if the patch lost
    /// to a terminal state.
    pub fn applied(self) -> Result<Job, PipelineError> {
        match self {
            Self::Applied(job) => Ok(job),
            Self::Stale(_) => Err(PipelineError::Superseded),
        }
    }
}

/// Result of [`JobRegistry::cancel`].
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The job was running and is now failed with the cancellation reason.
    /// Carries the prediction that was active at the time, if any.
    Cancelled {
        job: Job,
        active_prediction: Option<PredictionRef>,
    },
    /// The job had already finished; nothing changed.
    AlreadyFinished(Job),
}

pub struct JobRegistry {
    entries: RwLock<HashMap<JobId, Arc<Mutex<Entry>>>>,
    store: Option<Arc<dyn JobStore>>,
    notifier: Arc<UpdateNotifier>,
    /// Parent of every job's cancellation token.
    root: CancellationToken,
}

impl JobRegistry {
    pub fn new(notifier: Arc<UpdateNotifier>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store: None,
            notifier,
            root: CancellationToken::new(),
        }
    }

    /// Write every applied update through `store` before notifying.
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(&self) -> &Arc<UpdateNotifier> {
        &self.notifier
    }

    pub fn store(&self) -> Option<&Arc<dyn JobStore>> {
        self.store.as_ref()
    }

    /// Register a new job, persist it, and notify.
    pub async fn insert(&self, job: Job) -> Result<Job, PipelineError> {
        self.persist(&job).await?;
        let id = job.id;
        let entry = Entry {
            job: job.clone(),
            cancel: self.root.child_token(),
        };
        self.entries
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(entry)));

        self.notifier
            .notify(&JobUpdate {
                job: job.clone(),
                previous_status: job.status,
            })
            .await;
        Ok(job)
    }

    /// Load a job read back from the store, without writing or notifying.
    pub async fn restore(&self, job: Job) {
        let entry = Entry {
            cancel: self.root.child_token(),
            job,
        };
        let id = entry.job.id;
        self.entries
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(entry)));
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Some(guard.job.clone())
    }

    /// All known jobs, newest first.
    pub async fn list(&self) -> Vec<Job> {
        let entries: Vec<Arc<Mutex<Entry>>> =
            self.entries.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.lock().await.job.clone());
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn is_terminal(&self, id: JobId) -> bool {
        match self.entry(id).await {
            Some(entry) => entry.lock().await.job.is_terminal(),
            None => true,
        }
    }

    pub async fn cancel_token(&self, id: JobId) -> Option<CancellationToken> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Some(guard.cancel.clone())
    }

    /// Atomically merge `patch` into the job.
    pub async fn update(&self, id: JobId, patch: JobPatch) -> Result<UpdateOutcome, PipelineError> {
        self.apply(id, patch, None).await
    }

    /// Merge `patch` on behalf of the task that owns `run`.
    ///
    /// Once `run` is cancelled the task no longer owns the job, and the
    /// patch is reported as [`UpdateOutcome::Stale`] even if the job has
    /// since been reopened by another run.
    pub async fn update_for_run(
        &self,
        id: JobId,
        run: &CancellationToken,
        patch: JobPatch,
    ) -> Result<UpdateOutcome, PipelineError> {
        self.apply(id, patch, Some(run)).await
    }

    async fn apply(
        &self,
        id: JobId,
        patch: JobPatch,
        run: Option<&CancellationToken>,
    ) -> Result<UpdateOutcome, PipelineError> {
        let entry = self.entry(id).await.ok_or_else(|| not_found(id))?;
        let mut guard = entry.lock().await;

        if run.is_some_and(CancellationToken::is_cancelled) {
            return Ok(UpdateOutcome::Stale(guard.job.clone()));
        }

        let previous_status = guard.job.status;
        let mut next = guard.job.clone();
        match apply_patch(&mut next, patch, chrono::Utc::now()) {
            Ok(()) => {}
            Err(CoreError::Conflict(_)) => return Ok(UpdateOutcome::Stale(guard.job.clone())),
            Err(e) => return Err(e.into()),
        }

        self.persist(&next).await?;
        guard.job = next.clone();
        self.notifier
            .notify(&JobUpdate {
                job: next.clone(),
                previous_status,
            })
            .await;
        Ok(UpdateOutcome::Applied(next))
    }

    /// Request cancellation: signal the job's task and, unless the job has
    /// already finished, fail it with the cancellation reason.
    pub async fn cancel(&self, id: JobId) -> Result<CancelOutcome, PipelineError> {
        let entry = self.entry(id).await.ok_or_else(|| not_found(id))?;
        let active_prediction = {
            let guard = entry.lock().await;
            if guard.job.is_terminal() {
                return Ok(CancelOutcome::AlreadyFinished(guard.job.clone()));
            }
            guard.cancel.cancel();
            guard.job.manifest.active_prediction.clone()
        };

        match self.update(id, JobPatch::failed(CANCELLED_REASON)).await? {
            UpdateOutcome::Applied(job) => {
                tracing::info!(job_id = %id, "Job cancelled");
                Ok(CancelOutcome::Cancelled {
                    job,
                    active_prediction,
                })
            }
            UpdateOutcome::Stale(job) => Ok(CancelOutcome::AlreadyFinished(job)),
        }
    }

    /// Reopen a finished multi-scene job to regenerate one scene. The job
    /// gets a fresh cancellation token and the previous run's token is
    /// cancelled, so a task still unwinding from that run cannot write.
    pub async fn reopen_for_scene(&self, id: JobId, index: usize) -> Result<Job, PipelineError> {
        let entry = self.entry(id).await.ok_or_else(|| not_found(id))?;
        let mut guard = entry.lock().await;

        let previous_status = guard.job.status;
        let mut next = guard.job.clone();
        reopen_for_scene(&mut next, index, chrono::Utc::now())?;

        self.persist(&next).await?;
        guard.job = next.clone();
        guard.cancel.cancel();
        guard.cancel = self.root.child_token();
        self.notifier
            .notify(&JobUpdate {
                job: next.clone(),
                previous_status,
            })
            .await;
        Ok(next)
    }

    /// Cancel every job token without touching job state. Used on
    /// shutdown; unfinished jobs stay resumable.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    // ---- private helpers ----

    async fn entry(&self, id: JobId) -> Option<Arc<Mutex<Entry>>> {
        self.entries.read().await.get(&id).cloned()
    }

    async fn persist(&self, job: &Job) -> Result<(), PipelineError> {
        if let Some(store) = &self.store {
            store.write_job(job).await.map_err(|e| {
                tracing::error!(job_id = %job.id, error = %e, "Failed to persist job");
                PipelineError::Persistence(e.to_string())
            })?;
        }
        Ok(())
    }
}

fn not_found(id: JobId) -> PipelineError {
    PipelineError::Core(CoreError::NotFound {
        entity: "Job",
        id: id.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
