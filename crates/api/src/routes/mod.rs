pub mod health;
pub mod jobs;
pub mod webhooks;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                          WebSocket job updates (?job_id=)
///
/// /jobs                                        list, submit
/// /jobs/{id}                                   get
/// /jobs/{id}/cancel                            cancel (POST)
/// /jobs/{id}/scenes/{index}/regenerate         regenerate one scene (POST)
///
/// /webhooks/predictions/{job_id}               record persisted output (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/jobs", jobs::router())
        .nest("/webhooks", webhooks::router())
}
