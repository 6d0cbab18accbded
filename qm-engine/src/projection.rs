//! Attribute projection
//!
//! Renders the policy onto declarative flags on the observed root. The
//! flag set after a projection is always exactly the set implied by the
//! given state: every flag in the known key space is cleared first, then
//! truthy keys are re-set only when the global kill-switch is on.

use crate::tree::ObservedTree;
use qm_common::settings::PolicyState;
use tracing::debug;

/// Projects PolicyState onto the observed root's flag surface.
#[derive(Clone)]
pub struct AttributeProjection {
    tree: ObservedTree,
}

impl AttributeProjection {
    pub fn new(tree: ObservedTree) -> Self {
        Self { tree }
    }

    /// Idempotent, total projection: clear-then-set, never an incremental
    /// diff, so a stale flag from a previous state can never survive.
    pub fn project(&self, state: &PolicyState) {
        let root = self.tree.root();

        for name in PolicyState::flag_catalog() {
            self.tree.remove_attribute(root, name);
        }

        let flags = state.projected_flags();
        if !state.enabled() {
            debug!("Kill-switch off, all flags cleared");
            return;
        }
        for name in &flags {
            self.tree.set_attribute(root, name, "true");
        }
        debug!("Projected {} flags", flags.len());
    }
}
