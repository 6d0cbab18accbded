//! Configuration broker loop
//!
//! Serves the inter-context message protocol over an mpsc request
//! channel with per-request oneshot replies, so a response can resolve
//! asynchronously while the loop keeps serving. Subscribes to the
//! storage-change stream and invalidates the cache when another context
//! touches any of the persisted config keys.

use crate::cache::TieredConfigCache;
use crate::fetch::ConfigFetcher;
use qm_common::api::{ConfigRequest, ConfigResponse};
use qm_common::config::{RemoteConfig, CONFIG_CACHE_KEY, CONFIG_TIMESTAMP_KEY, CONFIG_VERSION_KEY};
use qm_common::db::Scope;
use qm_common::events::EventBus;
use qm_common::{Error, QmEvent, Result};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

struct BrokerRequest {
    request: ConfigRequest,
    reply: oneshot::Sender<ConfigResponse>,
}

/// Cloneable client handle to a running broker.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::Sender<BrokerRequest>,
}

impl BrokerHandle {
    /// Send one protocol request and await its (possibly asynchronous)
    /// response. The reply channel stays open until resolution.
    pub async fn request(&self, request: ConfigRequest) -> Result<ConfigResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BrokerRequest {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Internal("broker is not running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::Internal("broker dropped the reply channel".to_string()))
    }

    pub async fn ping(&self) -> Result<ConfigResponse> {
        self.request(ConfigRequest::Ping).await
    }

    /// Cached document without forcing a refresh.
    pub async fn get_config(&self) -> Result<Option<RemoteConfig>> {
        match self.request(ConfigRequest::GetConfig).await? {
            ConfigResponse::Config(config) => Ok(config),
            ConfigResponse::Pong { .. } => Err(Error::Internal("unexpected pong".to_string())),
        }
    }

    /// Document after a forced refresh.
    pub async fn refresh_config(&self) -> Result<Option<RemoteConfig>> {
        match self.request(ConfigRequest::RefreshConfig).await? {
            ConfigResponse::Config(config) => Ok(config),
            ConfigResponse::Pong { .. } => Err(Error::Internal("unexpected pong".to_string())),
        }
    }
}

/// The broker context: owns the tiered cache.
pub struct ConfigBroker<F> {
    cache: Arc<TieredConfigCache<F>>,
}

impl<F: ConfigFetcher> ConfigBroker<F> {
    pub fn new(cache: TieredConfigCache<F>) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Start the request loop and the invalidation listener, perform the
    /// startup (non-forced) load, and return the client handle.
    pub fn spawn(self, bus: &EventBus) -> BrokerHandle {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(Self::run(self.cache.clone(), rx));
        tokio::spawn(Self::invalidation_listener(self.cache.clone(), bus.subscribe()));

        // Startup load, without forcing
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let _ = cache.get(false).await;
        });

        info!("Config broker started");
        BrokerHandle { tx }
    }

    async fn run(cache: Arc<TieredConfigCache<F>>, mut rx: mpsc::Receiver<BrokerRequest>) {
        while let Some(BrokerRequest { request, reply }) = rx.recv().await {
            debug!(?request, "Broker request");
            let cache = cache.clone();
            // Each request resolves on its own; a slow refresh never
            // blocks a ping behind it
            tokio::spawn(async move {
                let response = match request {
                    ConfigRequest::Ping => ConfigResponse::pong(),
                    ConfigRequest::GetConfig => ConfigResponse::Config(cache.get(false).await),
                    ConfigRequest::RefreshConfig => ConfigResponse::Config(cache.get(true).await),
                };
                let _ = reply.send(response);
            });
        }
    }

    async fn invalidation_listener(
        cache: Arc<TieredConfigCache<F>>,
        mut rx: tokio::sync::broadcast::Receiver<QmEvent>,
    ) {
        loop {
            match rx.recv().await {
                Ok(QmEvent::StorageChanged {
                    scope: Scope::Local,
                    key,
                }) if is_config_key(&key) => {
                    debug!(key = %key, "Persisted config key changed");
                    cache.invalidate().await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {
                    // Missed events may have included a config change
                    cache.invalidate().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

fn is_config_key(key: &str) -> bool {
    key == CONFIG_CACHE_KEY || key == CONFIG_TIMESTAMP_KEY || key == CONFIG_VERSION_KEY
}
