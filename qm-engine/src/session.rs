//! Engine session wiring
//!
//! One session per activated context: loads the policy (materializing
//! defaults on first run), projects it onto the root, runs the first
//! reconciliation pass, arms the watchers, and keeps following policy
//! pushes from other contexts.

use crate::behaviors::{Phase, PlatformVariant, Reconciler};
use crate::filter::FilterPolicy;
use crate::projection::AttributeProjection;
use crate::tree::ObservedTree;
use crate::watcher::{arm_attribute_watcher, arm_listing_watcher, FILTER_DEBOUNCE_WINDOW};
use qm_common::settings::SettingsStore;
use qm_common::{QmEvent, Result};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

/// Root marker guarding against duplicate activation in the same tree.
pub const ACTIVE_MARKER: &str = "qm-active";

/// Presentation-only marker set when the session carries no
/// authentication token.
pub const SIGNED_OUT_MARKER: &str = "signed-out";

/// Context facts resolved once at activation.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub variant: PlatformVariant,
    pub signed_in: bool,
    /// Embedded (framed) contexts only activate on player pages.
    pub embedded: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            variant: PlatformVariant::Desktop,
            signed_in: true,
            embedded: false,
        }
    }
}

/// A live engine session over one observed tree.
pub struct EngineSession {
    tree: ObservedTree,
    reconciler: Arc<Reconciler>,
    policy: Arc<RwLock<FilterPolicy>>,
}

impl EngineSession {
    /// Initialize the engine over `tree`. Returns `None` when a session
    /// is already active in this tree (duplicate activation is skipped,
    /// never an error).
    pub async fn initialize(
        tree: ObservedTree,
        settings: SettingsStore,
        config: EngineConfig,
    ) -> Result<Option<Self>> {
        let root = tree.root();
        if tree.has_attribute(root, ACTIVE_MARKER) {
            info!("Engine already active in this tree, skipping");
            return Ok(None);
        }
        if config.embedded && tree.get_by_id("player").is_none() {
            info!("Embedded context without a player, skipping");
            return Ok(None);
        }
        tree.set_attribute(root, ACTIVE_MARKER, "true");

        let state = settings.load().await?;

        let projection = AttributeProjection::new(tree.clone());
        projection.project(&state);

        if config.variant == PlatformVariant::Desktop && !config.signed_in {
            tree.set_attribute(root, SIGNED_OUT_MARKER, "");
        }

        let policy = Arc::new(RwLock::new(FilterPolicy::from_state(&state)));
        let reconciler = Arc::new(Reconciler::new(tree.clone(), config.variant, policy.clone()));
        reconciler.reconcile_all(Phase::Activation);

        arm_attribute_watcher(reconciler.clone());
        arm_listing_watcher(reconciler.clone(), FILTER_DEBOUNCE_WINDOW);

        // Policy pushes from any context replace our view wholesale; the
        // projection's clear-then-set keeps the flag surface exact, and
        // the attribute watcher re-runs the affected behaviors
        {
            let policy = policy.clone();
            let reconciler = reconciler.clone();
            let mut rx = settings.events().subscribe();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(QmEvent::SettingsChanged { settings, .. }) => {
                            projection.project(&settings);
                            *policy.write().unwrap() = FilterPolicy::from_state(&settings);
                            reconciler.run_filter();
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            });
        }

        info!("Engine session initialized");
        Ok(Some(Self {
            tree,
            reconciler,
            policy,
        }))
    }

    /// Re-enter reconciliation for a lifecycle event.
    pub fn reconcile(&self, phase: Phase) {
        self.reconciler.reconcile_all(phase);
    }

    pub fn tree(&self) -> &ObservedTree {
        &self.tree
    }

    /// Whether the active location belongs to a blocked channel.
    pub fn is_current_page_blocked(&self, path: &str) -> bool {
        let policy = self.policy.read().unwrap().clone();
        self.reconciler.filter().is_current_page_blocked(path, &policy)
    }
}
