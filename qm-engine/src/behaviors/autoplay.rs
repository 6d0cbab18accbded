//! Playback-autostart suppression
//!
//! The autostart toggle lives inside the watch container, which the tree
//! owner rebuilds asynchronously around navigations. When the control is
//! observed "on" it is toggled once and a re-assertion loop armed; when
//! it is absent entirely, a one-shot structural watcher waits for the
//! owner to materialize it.

use super::retry::{self, ReassertTarget};
use super::{BehaviorRuntime, Phase, PlatformVariant};
use crate::tree::{MutationRecord, NodeId, ObservedTree};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

const WATCH_CONTAINER_TAG: &str = "ytd-watch-flexy";
const AUTONAV_TOGGLE_CLASS: &str = "ytp-autonav-toggle-button";

const MOBILE_PLAYER_CONTAINER_ID: &str = "player-container-id";
const MOBILE_PLAYER_ID: &str = "player";
const MOBILE_AUTONAV_CLASS: &str = "ytm-autonav-toggle-button-container";

pub(crate) fn reconcile(
    tree: &ObservedTree,
    runtime: &Arc<BehaviorRuntime>,
    variant: PlatformVariant,
    phase: Phase,
) {
    if !runtime.flags().hide_autoplay {
        return;
    }
    match variant {
        PlatformVariant::Desktop => desktop(tree, runtime),
        PlatformVariant::Mobile => {
            // The mobile player only exists after load/navigation
            if matches!(phase, Phase::Loaded | Phase::NavigationEnd) {
                mobile(tree);
            }
        }
    }
}

pub(crate) fn desktop(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>) {
    let Some(container) = tree.find_first_by_tag(tree.root(), WATCH_CONTAINER_TAG) else {
        return;
    };
    if tree.has_attribute(container, "hidden") {
        return;
    }
    if try_toggle(tree, runtime, container) {
        return;
    }
    arm_structural_watcher(tree, runtime, container);
}

pub(crate) fn mobile(tree: &ObservedTree) {
    if tree.get_by_id(MOBILE_PLAYER_CONTAINER_ID).is_none() {
        return;
    }
    let Some(player) = tree.get_by_id(MOBILE_PLAYER_ID) else {
        return;
    };
    if tree.has_attribute(player, "hidden") {
        return;
    }
    if let Some(toggle) = tree.find_first_by_class(tree.root(), MOBILE_AUTONAV_CLASS) {
        if tree.attribute(toggle, "aria-pressed").as_deref() == Some("true") {
            tree.activate(toggle);
        }
    }
}

/// Toggle the autostart control if present and "on". Returns false when
/// the control does not exist yet.
fn try_toggle(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>, container: NodeId) -> bool {
    let Some(button) = tree.find_first_by_class(container, AUTONAV_TOGGLE_CLASS) else {
        return false;
    };
    if tree.attribute(button, "aria-checked").as_deref() == Some("true") {
        tree.activate(button);
        retry::arm(tree, runtime, ReassertTarget::Autoplay, button);
    }
    true
}

/// One-shot structural watcher: the control is absent, so wait for the
/// owner to add content under the container, then retry. Disarms on
/// success or when the flag goes off.
fn arm_structural_watcher(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>, container: NodeId) {
    if runtime.autoplay_watcher_armed.swap(true, Ordering::SeqCst) {
        return;
    }
    debug!("Autostart control absent, watching the container");

    let tree = tree.clone();
    let runtime = runtime.clone();
    tokio::spawn(async move {
        let mut rx = tree.subscribe();
        loop {
            match rx.recv().await {
                Ok(MutationRecord::ChildAdded { node, .. }) => {
                    if !runtime.flags().hide_autoplay {
                        break;
                    }
                    if node != container && !tree.is_descendant_of(node, container) {
                        continue;
                    }
                    if try_toggle(&tree, &runtime, container) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        runtime.autoplay_watcher_armed.store(false, Ordering::SeqCst);
    });
}
