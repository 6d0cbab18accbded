//! # Quiet Mode Configuration Broker (qm-broker)
//!
//! Owns the tiered remote-configuration cache and serves the
//! inter-context message protocol: other contexts request or refresh the
//! cached document here instead of duplicating fetch logic. Ships the
//! `qm-broker` daemon exposing the protocol over HTTP.

pub mod broker;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod server;

pub use broker::{BrokerHandle, ConfigBroker};
pub use cache::{CacheEntry, TieredConfigCache};
pub use fetch::{ConfigFetcher, FetchError, HttpConfigFetcher};
