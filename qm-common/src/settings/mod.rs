//! Policy settings
//!
//! The policy is a flat map from dotted option keys to values: booleans for
//! feature flags, one list-valued key holding blocked channel identifiers,
//! and one boolean global kill-switch. Absence of a key always reads as
//! `false`/empty, never as an error. Consumers only ever see whole-value
//! replacements; partial in-place mutation is confined to the editing side.

mod store;

pub use store::{SettingsStore, SETTINGS_KEY};

use crate::channel::normalize_channel_id;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Global kill-switch key. When false, no flags are projected and the
/// content filter restores everything it hid.
pub const KILL_SWITCH_KEY: &str = "global.enabled";

/// The one list-valued key: blocked channel identifiers.
pub const BLOCKED_CHANNELS_KEY: &str = "youtube.blocked_channels";

/// Category prefix stripped from keys when projecting declarative flags.
pub const SITE_PREFIX: &str = "youtube.";

/// Default settings, shared between the broker and engine contexts.
///
/// This literal is the full known key space: the declarative-flag catalog
/// and the storage defaults are both derived from it.
const DEFAULT_FLAGS: &[(&str, bool)] = &[
    (KILL_SWITCH_KEY, true),
    ("youtube.hide_autoplay", true),
    ("youtube.hide_annotations", false),
    ("youtube.hide_bar", false),
    ("youtube.hide_channel", false),
    ("youtube.hide_comments", false),
    ("youtube.hide_desc", false),
    ("youtube.hide_endscreen", true),
    ("youtube.hide_feed", true),
    ("youtube.hide_header", false),
    ("youtube.hide_meta", false),
    ("youtube.hide_notifs", true),
    ("youtube.hide_playlists", false),
    ("youtube.hide_recommended", true),
    ("youtube.hide_shorts", true),
    ("youtube.hide_sidebar", false),
    ("youtube.hide_subs", false),
    ("youtube.hide_trending", true),
    ("youtube.redirect_home", false),
];

/// A single policy value: a boolean flag or the blocked-channel list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    List(Vec<String>),
}

/// The user-controlled policy: dotted option key -> value.
///
/// Serializes as the flat JSON object persisted under the `settings` key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyState {
    values: BTreeMap<String, SettingValue>,
}

impl PolicyState {
    /// The baked-in defaults, materialized on first activation.
    pub fn defaults() -> Self {
        let mut values: BTreeMap<String, SettingValue> = DEFAULT_FLAGS
            .iter()
            .map(|(key, value)| (key.to_string(), SettingValue::Flag(*value)))
            .collect();
        values.insert(BLOCKED_CHANNELS_KEY.to_string(), SettingValue::List(Vec::new()));
        Self { values }
    }

    /// Read a boolean flag. Absent or non-boolean keys read as `false`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(SettingValue::Flag(true)))
    }

    /// The global kill-switch.
    pub fn enabled(&self) -> bool {
        self.flag(KILL_SWITCH_KEY)
    }

    /// Raw blocked-channel entries as the user typed them.
    pub fn blocked_channels(&self) -> &[String] {
        match self.values.get(BLOCKED_CHANNELS_KEY) {
            Some(SettingValue::List(entries)) => entries,
            _ => &[],
        }
    }

    /// The blocked set in canonical form, ready for membership tests.
    pub fn blocked_identifiers(&self) -> BlockedIdentifierSet {
        BlockedIdentifierSet::from_raw(self.blocked_channels().iter().map(String::as_str))
    }

    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), SettingValue::Flag(value));
    }

    pub fn set_blocked_channels(&mut self, channels: Vec<String>) {
        self.values
            .insert(BLOCKED_CHANNELS_KEY.to_string(), SettingValue::List(channels));
    }

    /// Flag keys that project onto the observed root, with the category
    /// prefix stripped (e.g. `youtube.hide_feed` -> `hide_feed`).
    ///
    /// The kill-switch and the list-valued key are excluded; they drive
    /// dedicated logic rather than a declarative flag.
    pub fn flag_catalog() -> impl Iterator<Item = &'static str> {
        DEFAULT_FLAGS
            .iter()
            .filter(|(key, _)| *key != KILL_SWITCH_KEY)
            .filter_map(|(key, _)| key.strip_prefix(SITE_PREFIX))
    }

    /// Flags implied by this state: catalog keys that are currently truthy,
    /// prefix-stripped. Empty when the kill-switch is off.
    pub fn projected_flags(&self) -> Vec<&'static str> {
        if !self.enabled() {
            return Vec::new();
        }
        Self::flag_catalog()
            .filter(|name| self.flag(&format!("{SITE_PREFIX}{name}")))
            .collect()
    }
}

/// Set of canonical blocked identifiers.
///
/// Membership is always tested on normalized forms of both sides; the
/// presentation form (leading `@`, case) is never significant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockedIdentifierSet {
    canonical: BTreeSet<String>,
}

impl BlockedIdentifierSet {
    pub fn from_raw<'a>(entries: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            canonical: entries.into_iter().map(normalize_channel_id).collect(),
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.canonical.contains(&normalize_channel_id(identifier))
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_keys_read_false() {
        let state = PolicyState::default();
        assert!(!state.flag("youtube.hide_feed"));
        assert!(!state.enabled());
        assert!(state.blocked_channels().is_empty());
    }

    #[test]
    fn defaults_enable_kill_switch() {
        let defaults = PolicyState::defaults();
        assert!(defaults.enabled());
        assert!(defaults.flag("youtube.hide_feed"));
        assert!(!defaults.flag("youtube.hide_subs"));
        assert!(defaults.blocked_channels().is_empty());
    }

    #[test]
    fn flag_catalog_excludes_kill_switch_and_list() {
        let catalog: Vec<_> = PolicyState::flag_catalog().collect();
        assert!(catalog.contains(&"hide_feed"));
        assert!(catalog.contains(&"redirect_home"));
        assert!(!catalog.iter().any(|name| name.contains("enabled")));
        assert!(!catalog.contains(&"blocked_channels"));
    }

    #[test]
    fn projected_flags_respect_kill_switch() {
        let mut state = PolicyState::default();
        state.set_flag(KILL_SWITCH_KEY, true);
        state.set_flag("youtube.hide_feed", true);
        assert_eq!(state.projected_flags(), vec!["hide_feed"]);

        state.set_flag(KILL_SWITCH_KEY, false);
        assert!(state.projected_flags().is_empty());
    }

    #[test]
    fn blocked_set_normalizes_both_sides() {
        let set = BlockedIdentifierSet::from_raw(["@MrBeast", "UCabc"]);
        assert!(set.contains("mrbeast"));
        assert!(set.contains("@mrbeast"));
        assert!(set.contains("ucabc"));
        assert!(!set.contains("@someoneelse"));
    }

    #[test]
    fn round_trips_through_json() {
        let mut state = PolicyState::defaults();
        state.set_blocked_channels(vec!["@foo".into()]);
        let json = serde_json::to_string(&state).unwrap();
        let back: PolicyState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
        assert!(json.contains("\"youtube.blocked_channels\":[\"@foo\"]"));
    }
}
