//! Tiered configuration cache
//!
//! Three tiers: in-memory entry, persistent store entry with a 1-hour
//! TTL, and the network. A successful fetch is the only path that
//! persists; reads never write. Any fetch failure falls back through the
//! tiers regardless of staleness: only total absence of any cached
//! document yields nothing.

use crate::fetch::{ConfigFetcher, FetchError};
use qm_common::config::{RemoteConfig, CONFIG_CACHE_KEY, CONFIG_TIMESTAMP_KEY, CONFIG_VERSION_KEY};
use qm_common::db::{KvStore, Scope};
use qm_common::QmEvent;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Persistent-tier TTL: one hour.
pub const CACHE_DURATION_MS: i64 = 1000 * 60 * 60;

/// One cached document. Immutable once created; refresh replaces the
/// whole entry, never mutates fields in place.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: RemoteConfig,
    /// Milliseconds since epoch.
    pub fetched_at: i64,
    pub version: String,
}

/// The tiered cache. One instance per broker context; the in-memory tier
/// is dropped on the external invalidation signal.
pub struct TieredConfigCache<F> {
    store: KvStore,
    fetcher: F,
    memory: RwLock<Option<CacheEntry>>,
    /// Serializes fetches so one context never runs redundant refreshes.
    fetch_lock: Mutex<()>,
}

impl<F: ConfigFetcher> TieredConfigCache<F> {
    pub fn new(store: KvStore, fetcher: F) -> Self {
        Self {
            store,
            fetcher,
            memory: RwLock::new(None),
            fetch_lock: Mutex::new(()),
        }
    }

    /// Resolve the configuration document.
    ///
    /// Non-forced order: in-memory entry regardless of age, persistent
    /// entry younger than the TTL, then the network. Forced: straight to
    /// the network, with the prior entry kept available as fallback.
    pub async fn get(&self, force_refresh: bool) -> Option<RemoteConfig> {
        if !force_refresh {
            if let Some(entry) = self.memory.read().await.as_ref() {
                debug!("Using in-memory cached config");
                return Some(entry.value.clone());
            }

            if let Some(entry) = self.load_persistent().await {
                let age = now_ms() - entry.fetched_at;
                if age < CACHE_DURATION_MS {
                    debug!(age_s = age / 1000, "Using stored cache");
                    let value = entry.value.clone();
                    *self.memory.write().await = Some(entry);
                    return Some(value);
                }
                debug!(age_s = age / 1000, "Stored cache expired");
            }
        }

        match self.fetch_and_persist(force_refresh).await {
            Ok(config) => Some(config),
            Err(err) => {
                warn!("Config fetch failed ({err}), falling back to cached data");
                self.fallback().await
            }
        }
    }

    /// Drop the in-memory entry and reload without forcing, so this
    /// context observes what another context persisted.
    pub async fn invalidate(&self) {
        debug!("Config cache invalidated, reloading");
        *self.memory.write().await = None;
        let _ = self.get(false).await;
    }

    async fn fetch_and_persist(&self, force: bool) -> Result<RemoteConfig, FetchError> {
        let _pending = self.fetch_lock.lock().await;

        // A refresh that completed while we waited already did the work
        if !force {
            if let Some(entry) = self.memory.read().await.as_ref() {
                return Ok(entry.value.clone());
            }
        }

        let config = self.fetcher.fetch().await?;
        config
            .validate()
            .map_err(|e| FetchError::Validation(e.to_string()))?;

        let prior_version = self.memory.read().await.as_ref().map(|e| e.version.clone());
        if let Some(prior) = prior_version {
            if version_regressed(&config.version, &prior) {
                warn!(
                    from = %prior,
                    to = %config.version,
                    "Remote config version regressed; replacing anyway"
                );
            }
        }

        let entry = CacheEntry {
            fetched_at: now_ms(),
            version: config.version.clone(),
            value: config.clone(),
        };

        // Replace both tiers atomically from the consumer's view: memory
        // last, after all three persisted keys are written
        self.persist(&entry).await?;
        *self.memory.write().await = Some(entry);

        self.store.events().emit(QmEvent::ConfigRefreshed {
            version: config.version.clone(),
            timestamp: chrono::Utc::now(),
        });
        info!(version = %config.version, "Remote config cached");

        Ok(config)
    }

    /// Fallback chain on fetch failure: in-memory regardless of
    /// staleness, then persistent regardless of staleness, then nothing.
    async fn fallback(&self) -> Option<RemoteConfig> {
        if let Some(entry) = self.memory.read().await.as_ref() {
            warn!("Using stale in-memory cache as fallback");
            return Some(entry.value.clone());
        }

        if let Some(entry) = self.load_persistent().await {
            warn!("Using stale stored cache as fallback");
            let value = entry.value.clone();
            *self.memory.write().await = Some(entry);
            return Some(value);
        }

        None
    }

    async fn load_persistent(&self) -> Option<CacheEntry> {
        let value: RemoteConfig = self
            .store
            .get_json(Scope::Local, CONFIG_CACHE_KEY)
            .await
            .ok()
            .flatten()?;
        let fetched_at: i64 = self
            .store
            .get_json(Scope::Local, CONFIG_TIMESTAMP_KEY)
            .await
            .ok()
            .flatten()?;
        let version: String = self
            .store
            .get_json(Scope::Local, CONFIG_VERSION_KEY)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| value.version.clone());

        Some(CacheEntry {
            value,
            fetched_at,
            version,
        })
    }

    async fn persist(&self, entry: &CacheEntry) -> Result<(), FetchError> {
        let store_err = |e: qm_common::Error| FetchError::Store(e.to_string());
        self.store
            .put_json(Scope::Local, CONFIG_CACHE_KEY, &entry.value)
            .await
            .map_err(store_err)?;
        self.store
            .put_json(Scope::Local, CONFIG_TIMESTAMP_KEY, &entry.fetched_at)
            .await
            .map_err(store_err)?;
        self.store
            .put_json(Scope::Local, CONFIG_VERSION_KEY, &entry.version)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Dotted-segment version comparison, numeric where possible. Used only
/// to log regressions; replacement is unconditional either way.
fn version_regressed(new: &str, old: &str) -> bool {
    let parse = |v: &str| -> Option<Vec<u64>> { v.split('.').map(|s| s.parse().ok()).collect() };
    match (parse(new), parse(old)) {
        (Some(new_parts), Some(old_parts)) => new_parts < old_parts,
        _ => new < old,
    }
}
