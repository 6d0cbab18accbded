//! Notification-title stripping
//!
//! Strips the leading `"(<digits>) "` badge from the page title and keeps
//! re-stripping on external title writes until the flag goes off, at
//! which point the watcher disarms itself.

use super::{BehaviorRuntime, PlatformVariant};
use crate::tree::{MutationRecord, NodeId, ObservedTree};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

static NOTIFICATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(\d+\) +").unwrap());

pub(crate) fn reconcile(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>, variant: PlatformVariant) {
    if variant != PlatformVariant::Desktop {
        return;
    }
    if !runtime.flags().hide_notifs {
        return;
    }
    init_cleaner(tree, runtime);
}

fn init_cleaner(tree: &ObservedTree, runtime: &Arc<BehaviorRuntime>) {
    // The title node may not exist yet; a later pass retries
    let Some(title) = tree.find_first_by_tag(tree.root(), "title") else {
        return;
    };

    strip(tree, title);

    if runtime.title_watcher_running.swap(true, Ordering::SeqCst) {
        return;
    }

    let tree = tree.clone();
    let runtime = runtime.clone();
    tokio::spawn(async move {
        let mut rx = tree.subscribe();
        loop {
            match rx.recv().await {
                Ok(MutationRecord::TextChanged { node }) if node == title => {
                    if runtime.flags().hide_notifs {
                        strip(&tree, title);
                    } else {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        runtime.title_watcher_running.store(false, Ordering::SeqCst);
    });
}

fn strip(tree: &ObservedTree, title: NodeId) {
    let text = tree.text(title);
    if NOTIFICATION_RE.is_match(&text) {
        tree.set_text(title, &NOTIFICATION_RE.replace(&text, ""));
    }
}
