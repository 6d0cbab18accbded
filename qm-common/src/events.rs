//! Event bus for cross-context propagation
//!
//! Push-based change notification between loaded contexts: a context that
//! replaces the policy or a persisted key broadcasts the change, and every
//! other subscribed context receives it without polling.

use crate::db::Scope;
use crate::settings::PolicyState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Quiet Mode event types
///
/// Events are broadcast via [`EventBus`] and can be serialized for
/// diagnostics. Delivery order matches emission order per subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QmEvent {
    /// The policy was replaced wholesale. Carries the full new state so
    /// consumers never observe a partial mutation.
    SettingsChanged {
        settings: PolicyState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A persisted key changed in the key/value store. The tiered cache
    /// uses this as its invalidation signal.
    StorageChanged { scope: Scope, key: String },

    /// The broker replaced its cached configuration document.
    ConfigRefreshed {
        version: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus shared by all contexts in a process.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QmEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    /// Broadcast an event to all subscribers.
    pub fn emit(&self, event: QmEvent) {
        // No receivers is OK
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QmEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
