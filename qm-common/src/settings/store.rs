//! Settings synchronization store
//!
//! Loads and saves the policy through the key/value store. Saving pushes
//! the full new state to every subscribed context via the event bus, so a
//! change made in one context is observed everywhere without polling.

use crate::db::{KvStore, Scope};
use crate::events::QmEvent;
use crate::settings::PolicyState;
use crate::Result;
use tracing::debug;

/// Persisted key for the policy, in the synchronized scope.
pub const SETTINGS_KEY: &str = "settings";

/// Store facade for the policy.
#[derive(Clone)]
pub struct SettingsStore {
    store: KvStore,
}

impl SettingsStore {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    /// The event bus settings pushes are broadcast on.
    pub fn events(&self) -> &crate::events::EventBus {
        self.store.events()
    }

    /// Read the persisted policy, or materialize and persist the defaults
    /// when none exists yet (first activation, or cleared state).
    pub async fn load(&self) -> Result<PolicyState> {
        if let Some(state) = self.store.get_json::<PolicyState>(Scope::Sync, SETTINGS_KEY).await? {
            return Ok(state);
        }

        debug!("No persisted settings, materializing defaults");
        let defaults = PolicyState::defaults();
        self.save(&defaults).await?;
        Ok(defaults)
    }

    /// Persist a whole-value replacement of the policy and push it to all
    /// contexts.
    pub async fn save(&self, next: &PolicyState) -> Result<()> {
        self.store.put_json(Scope::Sync, SETTINGS_KEY, next).await?;
        self.store.events().emit(QmEvent::SettingsChanged {
            settings: next.clone(),
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }
}
