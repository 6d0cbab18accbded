//! Inter-context message protocol
//!
//! Request/response types shared by the broker's message loop and its HTTP
//! surface. The wire shape is a JSON object tagged by a `message` field,
//! e.g. `{"message": "getConfig"}`.

use crate::config::RemoteConfig;
use serde::{Deserialize, Serialize};

/// A request to the configuration broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "camelCase")]
pub enum ConfigRequest {
    /// Liveness check.
    Ping,
    /// Current configuration document, served from cache without forcing
    /// a refresh.
    GetConfig,
    /// Configuration document after a forced refresh.
    RefreshConfig,
}

/// A broker response. Serializes as either the pong object or the
/// configuration document (`null` when no document is available).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigResponse {
    Pong { status: String, timestamp: i64 },
    Config(Option<RemoteConfig>),
}

impl ConfigResponse {
    pub fn pong() -> Self {
        ConfigResponse::Pong {
            status: "ok".to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
