//! Remote configuration document types
//!
//! The versioned document fetched by the broker: per-site URL patterns and
//! block rules. A document is immutable once cached; refresh replaces the
//! whole entry.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted key for the cached document (local scope).
pub const CONFIG_CACHE_KEY: &str = "remote_config";
/// Persisted key for the fetch timestamp, milliseconds since epoch.
pub const CONFIG_TIMESTAMP_KEY: &str = "config_timestamp";
/// Persisted key for the cached document's version string.
pub const CONFIG_VERSION_KEY: &str = "config_version";

/// The remote configuration document.
///
/// Fields default to empty on deserialization so a structurally-missing
/// `version` or `sites` surfaces as a validation failure rather than a
/// parse error; both paths end in cache fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub sites: BTreeMap<String, SiteRules>,
}

/// Rules for one supported site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRules {
    /// URL match patterns selecting this site (`*` wildcards).
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub rules: Vec<BlockRule>,
}

/// One block rule within a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRule {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub url_patterns: Vec<String>,
    #[serde(default)]
    pub selectors: Vec<String>,
    #[serde(default)]
    pub default_enabled: bool,
}

impl RemoteConfig {
    /// Structural validation: a document must carry a version and a
    /// non-empty site-rule mapping to be cacheable.
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(Error::Config("document is missing a version".to_string()));
        }
        if self.sites.is_empty() {
            return Err(Error::Config("document has no site rules".to_string()));
        }
        Ok(())
    }

    /// Find the site whose patterns match `url`, if any.
    pub fn site_for_url(&self, url: &str) -> Option<(&str, &SiteRules)> {
        self.sites
            .iter()
            .find(|(_, site)| site.patterns.iter().any(|p| pattern_matches(p, url)))
            .map(|(name, site)| (name.as_str(), site))
    }
}

/// Match a URL against a `*`-wildcard pattern like `*://*.youtube.com/*`.
fn pattern_matches(pattern: &str, url: &str) -> bool {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    match Regex::new(&format!("^{escaped}$")) {
        Ok(re) => re.is_match(url),
        Err(_) => false,
    }
}
