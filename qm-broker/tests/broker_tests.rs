//! Tests for the broker request loop and invalidation listener

use qm_broker::broker::ConfigBroker;
use qm_broker::cache::TieredConfigCache;
use qm_broker::fetch::{ConfigFetcher, FetchError};
use qm_common::api::ConfigResponse;
use qm_common::config::{
    RemoteConfig, SiteRules, CONFIG_CACHE_KEY, CONFIG_TIMESTAMP_KEY, CONFIG_VERSION_KEY,
};
use qm_common::db::{KvStore, Scope};
use qm_common::events::EventBus;
use std::collections::BTreeMap;
use std::time::Duration;

fn doc(version: &str) -> RemoteConfig {
    let mut sites = BTreeMap::new();
    sites.insert(
        "youtube".to_string(),
        SiteRules {
            patterns: vec!["*://*.youtube.com/*".to_string()],
            rules: vec![],
        },
    );
    RemoteConfig {
        version: version.to_string(),
        last_updated: "2025-06-01".to_string(),
        sites,
    }
}

/// Fetcher with a fixed outcome.
struct FixedFetcher(Option<RemoteConfig>);

impl ConfigFetcher for FixedFetcher {
    async fn fetch(&self) -> Result<RemoteConfig, FetchError> {
        match &self.0 {
            Some(config) => Ok(config.clone()),
            None => Err(FetchError::Network("connection refused".to_string())),
        }
    }
}

async fn spawn_broker(
    fetcher: FixedFetcher,
) -> (qm_broker::BrokerHandle, KvStore, EventBus) {
    let bus = EventBus::new();
    let store = KvStore::open_in_memory(bus.clone()).await.unwrap();
    let cache = TieredConfigCache::new(store.clone(), fetcher);
    let handle = ConfigBroker::new(cache).spawn(&bus);
    (handle, store, bus)
}

#[tokio::test]
async fn ping_responds_ok_with_timestamp() {
    let (handle, _store, _bus) = spawn_broker(FixedFetcher(None)).await;

    match handle.ping().await.unwrap() {
        ConfigResponse::Pong { status, timestamp } => {
            assert_eq!(status, "ok");
            assert!(timestamp > 0);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn get_config_serves_the_cached_document() {
    let (handle, _store, _bus) = spawn_broker(FixedFetcher(Some(doc("1")))).await;

    let config = handle.get_config().await.unwrap().unwrap();
    assert_eq!(config.version, "1");
}

#[tokio::test]
async fn get_config_with_nothing_available_is_null() {
    let (handle, _store, _bus) = spawn_broker(FixedFetcher(None)).await;
    assert!(handle.get_config().await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_config_forces_a_fetch() {
    let (handle, _store, _bus) = spawn_broker(FixedFetcher(Some(doc("7")))).await;

    let config = handle.refresh_config().await.unwrap().unwrap();
    assert_eq!(config.version, "7");
}

#[tokio::test]
async fn anothers_contexts_persisted_write_reaches_this_broker() {
    let (handle, store, _bus) = spawn_broker(FixedFetcher(Some(doc("1")))).await;

    // Warm the in-memory tier
    assert_eq!(handle.get_config().await.unwrap().unwrap().version, "1");

    // Another context replaces all three persisted keys
    let newer = doc("2");
    let now = chrono::Utc::now().timestamp_millis();
    store.put_json(Scope::Local, CONFIG_CACHE_KEY, &newer).await.unwrap();
    store.put_json(Scope::Local, CONFIG_TIMESTAMP_KEY, &now).await.unwrap();
    store.put_json(Scope::Local, CONFIG_VERSION_KEY, &newer.version).await.unwrap();

    // The invalidation listener runs asynchronously; poll until the
    // broker observes the replacement
    let mut observed = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if let Some(config) = handle.get_config().await.unwrap() {
            if config.version == "2" {
                observed = Some(config.version);
                break;
            }
        }
    }
    assert_eq!(observed.as_deref(), Some("2"));
}
