//! Change-notification watchers
//!
//! Two subscriptions over the observed tree's mutation stream: a
//! structural watcher that schedules a debounced content-filter pass when
//! added nodes match the listing-item catalog, and an attribute watcher
//! that dispatches root flag changes to only the behaviors they back.

use crate::behaviors::{Reconciler, FLAG_ATTRIBUTE_FILTER};
use crate::debounce::CoalescingQueue;
use crate::filter::ContentFilter;
use crate::tree::{MutationRecord, NodeId, ObservedTree};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Quiet interval for coalescing listing-item bursts (infinite scroll
/// loads dozens of items in one batch).
pub const FILTER_DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Watch the root's declarative flags and re-run only the behaviors whose
/// backing flag changed.
pub fn arm_attribute_watcher(reconciler: Arc<Reconciler>) -> JoinHandle<()> {
    let tree = reconciler.tree().clone();
    tokio::spawn(async move {
        let root = tree.root();
        let mut rx = tree.subscribe();
        loop {
            match rx.recv().await {
                Ok(MutationRecord::AttributeChanged { node, name })
                    if node == root && FLAG_ATTRIBUTE_FILTER.contains(&name.as_str()) =>
                {
                    reconciler.on_flag_changed(&name);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Watch for added listing items anywhere under the root and schedule a
/// debounced filter pass.
pub fn arm_listing_watcher(reconciler: Arc<Reconciler>, window: Duration) -> JoinHandle<()> {
    let tree = reconciler.tree().clone();
    let flusher = reconciler.clone();
    let queue = CoalescingQueue::spawn(window, move || {
        let reconciler = flusher.clone();
        async move {
            reconciler.run_filter();
        }
    });

    tokio::spawn(async move {
        let mut rx = tree.subscribe();
        loop {
            match rx.recv().await {
                Ok(MutationRecord::ChildAdded { node, .. }) => {
                    if subtree_has_listing_item(&tree, node) {
                        queue.signal();
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {
                    // Missed records may have contained listing items
                    queue.signal();
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// An added node qualifies when it, or anything inside it, matches the
/// listing-item catalog (batches often add a container with items inside).
fn subtree_has_listing_item(tree: &ObservedTree, node: NodeId) -> bool {
    if ContentFilter::is_listing_item(tree, node) {
        return true;
    }
    tree.descendants(node)
        .into_iter()
        .any(|n| ContentFilter::is_listing_item(tree, n))
}
