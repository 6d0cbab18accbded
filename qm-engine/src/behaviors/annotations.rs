//! Annotation suppression
//!
//! The annotation toggle lives inside the player's settings menu, whose
//! content the player materializes lazily on first open. The settings
//! affordance itself may not exist yet either. Resolution order: locate
//! the affordance (or arm a one-shot structural watcher for it), open the
//! menu to force its content to exist, toggle the annotation item, close
//! the menu again, then re-assert like autostart suppression.

use super::retry::{self, ReassertTarget};
use super::{BehaviorRuntime, PlatformVariant};
use crate::tree::{MutationRecord, NodeId, ObservedTree};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

const PLAYER_ID: &str = "movie_player";
const SETTINGS_BUTTON_CLASS: &str = "ytp-settings-button";
const MENU_ITEM_CLASS: &str = "ytp-menuitem";
const ANNOTATIONS_LABEL: &str = "Annotations";

pub(crate) fn reconcile(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>, variant: PlatformVariant) {
    if variant != PlatformVariant::Desktop {
        return;
    }
    if !runtime.flags().hide_annotations {
        return;
    }
    let Some(player) = tree.get_by_id(PLAYER_ID) else {
        return;
    };
    if try_suppress(tree, runtime, player) {
        return;
    }
    arm_structural_watcher(tree, runtime, player);
}

fn find_annotation_item(tree: &ObservedTree, player: NodeId) -> Option<NodeId> {
    tree.find_by_class(player, MENU_ITEM_CLASS).into_iter().find(|item| {
        tree.text(*item).trim() == ANNOTATIONS_LABEL
            || tree.attribute(*item, "aria-label").as_deref() == Some(ANNOTATIONS_LABEL)
    })
}

/// Attempt the suppression. Returns false while the affordance or its
/// lazy menu content is still missing.
fn try_suppress(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>, player: NodeId) -> bool {
    let Some(button) = tree.find_first_by_class(player, SETTINGS_BUTTON_CLASS) else {
        return false;
    };

    if let Some(item) = find_annotation_item(tree, player) {
        if tree.attribute(item, "aria-checked").as_deref() == Some("true") {
            debug!("Turning annotations off");
            tree.activate(item);
            retry::arm(tree, runtime, ReassertTarget::Annotations, item);
        }
        // Close the menu again if one of our passes opened it
        if runtime.annotation_menu_open.swap(false, Ordering::SeqCst) {
            tree.activate(button);
        }
        return true;
    }

    // Menu content is lazy; open it once and let the structural watcher
    // finish the job when the items materialize
    if !runtime.annotation_menu_open.swap(true, Ordering::SeqCst) {
        debug!("Opening player settings menu to materialize items");
        tree.activate(button);
    }
    false
}

/// One-shot structural watcher on the player container: re-attempts once
/// qualifying descendant content appears, then disarms.
fn arm_structural_watcher(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>, player: NodeId) {
    if runtime.annotation_watcher_armed.swap(true, Ordering::SeqCst) {
        return;
    }
    debug!("Annotation affordance absent, watching the player");

    let tree = tree.clone();
    let runtime = runtime.clone();
    tokio::spawn(async move {
        let mut rx = tree.subscribe();
        loop {
            match rx.recv().await {
                Ok(MutationRecord::ChildAdded { node, .. }) => {
                    if !runtime.flags().hide_annotations {
                        break;
                    }
                    if node != player && !tree.is_descendant_of(node, player) {
                        continue;
                    }
                    if try_suppress(&tree, &runtime, player) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        runtime.annotation_watcher_armed.store(false, Ordering::SeqCst);
    });
}
