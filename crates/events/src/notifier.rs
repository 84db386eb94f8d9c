//! Per-job update subscriptions.
//!
//! Subscribers register a callback for one job id and receive every
//! [`JobUpdate`] for that job, in order, after the update has been
//! recorded. Subscriptions live until [`UpdateNotifier::unsubscribe`] or
//! [`UpdateNotifier::unsubscribe_job`] removes them; nothing is pruned
//! implicitly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mediaflow_core::job::JobUpdate;
use mediaflow_core::types::JobId;
use tokio::sync::{broadcast, RwLock};

use crate::bus::EventBus;

/// Callback invoked with each update for a subscribed job.
pub type UpdateCallback = Arc<dyn Fn(&JobUpdate) + Send + Sync>;

/// Handle returned by [`UpdateNotifier::on_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    callback: UpdateCallback,
}

/// Fans job updates out to per-job callbacks and to the global [`EventBus`].
pub struct UpdateNotifier {
    subscribers: RwLock<HashMap<JobId, Vec<Subscriber>>>,
    next_id: AtomicU64,
    bus: EventBus,
}

impl UpdateNotifier {
    pub fn new(bus: EventBus) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            bus,
        }
    }

    /// Register `callback` for updates of `job_id`.
    pub async fn on_update(&self, job_id: JobId, callback: UpdateCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .await
            .entry(job_id)
            .or_default()
            .push(Subscriber { id, callback });
        tracing::debug!(job_id = %job_id, subscription = id.0, "Update subscription added");
        id
    }

    /// Remove one subscription. Returns `false` if it was not registered.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().await;
        let mut removed = false;
        subs.retain(|_, list| {
            let before = list.len();
            list.retain(|s| s.id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Remove every subscription for a job. Returns how many were removed.
    pub async fn unsubscribe_job(&self, job_id: JobId) -> usize {
        self.subscribers
            .write()
            .await
            .remove(&job_id)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    pub async fn subscriber_count(&self, job_id: JobId) -> usize {
        self.subscribers
            .read()
            .await
            .get(&job_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Deliver `update` to the job's subscribers and publish it on the bus.
    ///
    /// Callbacks are invoked outside the subscriber lock, so a callback may
    /// itself subscribe or unsubscribe.
    pub async fn notify(&self, update: &JobUpdate) {
        let callbacks: Vec<UpdateCallback> = self
            .subscribers
            .read()
            .await
            .get(&update.job_id())
            .map(|list| list.iter().map(|s| Arc::clone(&s.callback)).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(update);
        }

        self.bus.publish(update.clone());
    }

    /// Subscribe to the firehose of all job updates.
    pub fn subscribe_all(&self) -> broadcast::Receiver<JobUpdate> {
        self.bus.subscribe()
    }
}

impl Default for UpdateNotifier {
    fn default() -> Self {
        Self::new(EventBus::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mediaflow_core::job::{Job, JobStatus, MediaType};
    use mediaflow_core::options::GenerationOptions;

    use super::*;

    fn update_for(job: &Job, previous: JobStatus) -> JobUpdate {
        JobUpdate {
            job: job.clone(),
            previous_status: previous,
        }
    }

    fn job() -> Job {
        Job::new(GenerationOptions::new(MediaType::Video, "a kite"))
    }

    fn recorder() -> (UpdateCallback, Arc<Mutex<Vec<JobStatus>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: UpdateCallback = Arc::new(move |u: &JobUpdate| {
            sink.lock().unwrap().push(u.job.status);
        });
        (callback, seen)
    }

    #[tokio::test]
    async fn callback_receives_only_its_job() {
        let notifier = UpdateNotifier::default();
        let a = job();
        let b = job();
        let (callback, seen) = recorder();
        notifier.on_update(a.id, callback).await;

        notifier.notify(&update_for(&a, JobStatus::Queued)).await;
        notifier.notify(&update_for(&b, JobStatus::Queued)).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let notifier = UpdateNotifier::default();
        let a = job();
        let (callback, seen) = recorder();
        let id = notifier.on_update(a.id, callback).await;

        notifier.notify(&update_for(&a, JobStatus::Queued)).await;
        assert!(notifier.unsubscribe(id).await);
        assert!(!notifier.unsubscribe(id).await);
        notifier.notify(&update_for(&a, JobStatus::Queued)).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(notifier.subscriber_count(a.id).await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_job_removes_all() {
        let notifier = UpdateNotifier::default();
        let a = job();
        let (c1, _) = recorder();
        let (c2, _) = recorder();
        notifier.on_update(a.id, c1).await;
        notifier.on_update(a.id, c2).await;

        assert_eq!(notifier.unsubscribe_job(a.id).await, 2);
        assert_eq!(notifier.subscriber_count(a.id).await, 0);
    }

    #[tokio::test]
    async fn notify_publishes_on_bus() {
        let notifier = UpdateNotifier::default();
        let mut rx = notifier.subscribe_all();
        let a = job();

        notifier.notify(&update_for(&a, JobStatus::Queued)).await;

        let received = rx.recv().await.expect("bus should carry the update");
        assert_eq!(received.job_id(), a.id);
    }
}
