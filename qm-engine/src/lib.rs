//! # Quiet Mode Reconciliation Engine (qm-engine)
//!
//! Page-side engine that reconciles an externally-owned content tree
//! against the user's policy: projects declarative flags onto the root,
//! suppresses playback autostart and annotations, strips notification
//! badges from the title, rewrites the home link, and hides listed items
//! from blocked channels. The tree owner may tear down and rebuild any of
//! these structures at any time; the engine's job is to keep re-winning.

pub mod behaviors;
pub mod debounce;
pub mod filter;
pub mod projection;
pub mod session;
pub mod tree;
pub mod watcher;

pub use behaviors::{Phase, PlatformVariant, Reconciler};
pub use session::{EngineConfig, EngineSession};
pub use tree::{MutationRecord, NodeId, ObservedTree};
