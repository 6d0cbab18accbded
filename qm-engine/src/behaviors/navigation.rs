//! Home-navigation redirection
//!
//! Active only while hide-feed and redirect-home hold and
//! hide-subscriptions does not. While active, the home link's target is
//! rewritten to the subscriptions feed and its activation intercepted so
//! the owner's router never sees the original destination; external
//! reassertions of the original target are rewritten back. Deactivation
//! removes the interception and restores the original target exactly
//! once.

use super::{BehaviorRuntime, FlagView};
use crate::tree::{MutationRecord, NodeId, ObservedTree};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

const HOME_LINK_ID: &str = "logo";
const REDIRECT_TARGET: &str = "/feed/subscriptions";

fn redirect_active(flags: FlagView) -> bool {
    flags.hide_feed && flags.redirect_home && !flags.hide_subs
}

pub(crate) fn reconcile(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>) {
    let Some(link) = tree.get_by_id(HOME_LINK_ID) else {
        return;
    };
    if redirect_active(runtime.flags()) {
        activate_redirect(tree, runtime, link);
    } else {
        deactivate_redirect(tree, runtime, link);
    }
}

fn activate_redirect(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>, link: NodeId) {
    {
        let mut original = runtime.nav_original_target.lock().unwrap();
        if original.is_none() {
            *original = tree.attribute(link, "href");
            debug!(original = ?*original, "Redirecting home link");
        }
    }
    tree.set_attribute(link, "href", REDIRECT_TARGET);
    tree.set_activation_intercepted(link, true);
    arm_reassert_watcher(tree, runtime, link);
}

/// Restore the original target and remove the interception. Idempotent:
/// a second deactivation finds nothing to restore.
fn deactivate_redirect(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>, link: NodeId) {
    tree.set_activation_intercepted(link, false);
    let original = runtime.nav_original_target.lock().unwrap().take();
    if let Some(href) = original {
        debug!("Restoring home link target");
        tree.set_attribute(link, "href", &href);
    }
}

/// Watch the link for external reassertion of its original target and
/// rewrite it back while the redirect condition holds.
fn arm_reassert_watcher(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>, link: NodeId) {
    if runtime.nav_watcher_armed.swap(true, Ordering::SeqCst) {
        return;
    }

    let tree = tree.clone();
    let runtime = runtime.clone();
    tokio::spawn(async move {
        let mut rx = tree.subscribe();
        loop {
            match rx.recv().await {
                Ok(MutationRecord::AttributeChanged { node, name })
                    if node == link && name == "href" =>
                {
                    if !redirect_active(runtime.flags()) {
                        break;
                    }
                    tree.set_attribute(link, "href", REDIRECT_TARGET);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        runtime.nav_watcher_armed.store(false, Ordering::SeqCst);
    });
}
