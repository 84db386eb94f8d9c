//! Job update notification.
//!
//! - [`UpdateNotifier`]: per-job callback registry with explicit
//!   unsubscribe. The job registry calls [`UpdateNotifier::notify`] once
//!   per applied update.
//! - [`EventBus`]: in-process fan-out of every update, backed by
//!   `tokio::sync::broadcast`, used by the WebSocket bridge.

pub mod bus;
pub mod notifier;

pub use bus::EventBus;
pub use notifier::{SubscriptionId, UpdateCallback, UpdateNotifier};
