//! WebSocket infrastructure for real-time job updates.
//!
//! Provides connection management, heartbeat monitoring, the bridge from
//! the pipeline's update stream, and the HTTP upgrade handler.

mod bridge;
mod handler;
mod heartbeat;
pub mod manager;

pub use bridge::{start_update_bridge, update_message};
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
