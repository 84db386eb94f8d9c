use std::sync::Arc;

use mediaflow_pipeline::Pipeline;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every field is behind `Arc` or is already a handle.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, present only when `DATABASE_URL` is configured.
    pub pool: Option<mediaflow_db::DbPool>,
    pub config: Arc<ServerConfig>,
    /// Job pipeline: submission, inspection, cancellation.
    pub pipeline: Pipeline,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
}
