//! Content filter: blocked-identifier suppression
//!
//! Scans a bounded scope for listing items, extracts a channel identifier
//! from each via a prioritized sequence of strategies, and hides or
//! restores items against the blocked set. A node carries the blocked
//! marker exactly while the filter considers it blocked; clearing the
//! marker always restores visibility in the same step.

use crate::tree::{NodeId, ObservedTree};
use qm_common::channel::extract_channel_from_url;
use qm_common::settings::{BlockedIdentifierSet, PolicyState};
use tracing::debug;

/// Fixed catalog of listing-item shapes the filter recognizes.
pub const LISTING_ITEM_TAGS: &[&str] = &[
    "ytd-rich-item-renderer",
    "ytd-video-renderer",
    "ytd-compact-video-renderer",
    "ytd-grid-video-renderer",
    "ytd-channel-renderer",
];

/// Element carrying the channel handle text within a listing item.
const CHANNEL_NAME_TAG: &str = "ytd-channel-name";

/// Explicit channel-identifier attribute some item renderers carry.
const CHANNEL_ID_ATTR: &str = "channel-id";

/// The filter's view of the policy: the kill-switch plus the canonical
/// blocked set. Replaced wholesale whenever the policy changes.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    pub enabled: bool,
    pub blocked: BlockedIdentifierSet,
}

impl FilterPolicy {
    pub fn from_state(state: &PolicyState) -> Self {
        Self {
            enabled: state.enabled(),
            blocked: state.blocked_identifiers(),
        }
    }
}

/// Reconciles listing items in the observed tree against the blocked set.
#[derive(Clone)]
pub struct ContentFilter {
    tree: ObservedTree,
}

impl ContentFilter {
    pub fn new(tree: ObservedTree) -> Self {
        Self { tree }
    }

    /// Does `node` match the listing-item catalog?
    pub fn is_listing_item(tree: &ObservedTree, node: NodeId) -> bool {
        LISTING_ITEM_TAGS.contains(&tree.tag(node).as_str())
    }

    /// One reconciliation pass over `scope`. Idempotent: re-running with
    /// unchanged inputs applies no further tree mutations.
    pub fn reconcile(&self, scope: NodeId, policy: &FilterPolicy) {
        let suppressing = policy.enabled && !policy.blocked.is_empty();
        let mut hidden = 0usize;
        let mut restored = 0usize;

        for node in self.tree.descendants(scope) {
            if !Self::is_listing_item(&self.tree, node) {
                continue;
            }
            let blocked = suppressing
                && self
                    .extract_identifier(node)
                    .is_some_and(|id| policy.blocked.contains(&id));
            if blocked {
                if !self.tree.has_blocked_marker(node) {
                    self.tree.hide(node);
                    self.tree.set_blocked_marker(node, true);
                    hidden += 1;
                }
            } else if self.tree.has_blocked_marker(node) {
                self.tree.set_blocked_marker(node, false);
                self.tree.restore(node);
                restored += 1;
            }
        }

        if hidden > 0 || restored > 0 {
            debug!(hidden, restored, "Filter pass applied changes");
        }
    }

    /// Extract the candidate channel identifier for a listing item.
    ///
    /// Strategies, first non-null wins: a channel-link anchor's href, the
    /// channel-name element's handle text, an explicit channel-id
    /// attribute on the item itself.
    pub fn extract_identifier(&self, item: NodeId) -> Option<String> {
        for anchor in self.tree.find_by_tag(item, "a") {
            if let Some(id) = self
                .tree
                .attribute(anchor, "href")
                .as_deref()
                .and_then(extract_channel_from_url)
            {
                return Some(id);
            }
        }

        if let Some(name_node) = self.tree.find_first_by_tag(item, CHANNEL_NAME_TAG) {
            let text = self.tree.text(name_node);
            let text = text.trim();
            if text.starts_with('@') {
                if let Some(id) = extract_channel_from_url(text) {
                    return Some(id);
                }
            }
        }

        self.tree.attribute(item, CHANNEL_ID_ATTR)
    }

    /// Whether the active location's identifier is in the blocked set,
    /// for suppressing an entire page rather than individual items.
    pub fn is_current_page_blocked(&self, path: &str, policy: &FilterPolicy) -> bool {
        if !policy.enabled || policy.blocked.is_empty() {
            return false;
        }
        extract_channel_from_url(path).is_some_and(|id| policy.blocked.contains(&id))
    }
}
