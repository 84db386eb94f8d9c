//! Forwards every registry update to connected WebSocket clients.

use std::sync::Arc;

use axum::extract::ws::Message;
use mediaflow_core::job::{JobStatus, JobUpdate, CANCELLED_REASON};
use mediaflow_core::job_events::{
    MSG_TYPE_JOB_CANCELLED, MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_FAILED, MSG_TYPE_JOB_PROGRESS,
};
use mediaflow_events::UpdateNotifier;
use tokio::sync::broadcast::error::RecvError;

use crate::ws::WsManager;

/// Build the client-facing message for one job update.
pub fn update_message(update: &JobUpdate) -> serde_json::Value {
    let job = &update.job;
    let msg_type = match job.status {
        JobStatus::Completed => MSG_TYPE_JOB_COMPLETED,
        JobStatus::Failed if job.error.as_deref() == Some(CANCELLED_REASON) => {
            MSG_TYPE_JOB_CANCELLED
        }
        JobStatus::Failed => MSG_TYPE_JOB_FAILED,
        _ => MSG_TYPE_JOB_PROGRESS,
    };

    serde_json::json!({
        "type": msg_type,
        "job_id": job.id,
        "status": job.status,
        "progress": job.progress,
        "outputs": job.outputs,
        "error": job.error,
    })
}

/// Spawn the task relaying the notifier's update stream to `ws_manager`.
///
/// Ends when the notifier is dropped; abort the handle to stop it earlier.
pub fn start_update_bridge(
    notifier: &UpdateNotifier,
    ws_manager: Arc<WsManager>,
) -> tokio::task::JoinHandle<()> {
    let mut updates = notifier.subscribe_all();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    let payload = update_message(&update);
                    ws_manager
                        .send_job_update(
                            update.job_id(),
                            Message::Text(payload.to_string().into()),
                        )
                        .await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "WebSocket bridge lagged behind job updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("Job update bridge stopped");
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
