//! Behavior reconciliation engine
//!
//! Five independent behaviors re-applied against the observed tree from a
//! single entry point: playback-autostart suppression, annotation
//! suppression, notification-title stripping, home-navigation redirection,
//! and blocked-identifier item suppression (delegated to the content
//! filter). All share one lazy-init gate keyed on the first read of the
//! declarative flags; per-behavior runtime state lives in an explicit
//! struct owned by the engine instance so a fresh engine starts unknown.

mod annotations;
mod autoplay;
mod navigation;
pub mod retry;
mod title;

use crate::filter::{ContentFilter, FilterPolicy};
use crate::tree::ObservedTree;
use self::retry::RetryState;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};

/// Lifecycle phase a reconciliation pass runs in. Some structures only
/// exist after a navigation completes, not on first activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// First script activation.
    Activation,
    /// Document load completed.
    Loaded,
    /// A soft navigation finished.
    NavigationEnd,
}

/// Platform variant, resolved once at engine construction and passed
/// down; never re-detected at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformVariant {
    Desktop,
    Mobile,
}

/// Root attributes the attribute watcher dispatches on. Changes to any
/// other attribute never trigger behavior re-runs.
pub const FLAG_ATTRIBUTE_FILTER: &[&str] = &[
    "hide_autoplay",
    "hide_notifs",
    "hide_annotations",
    "hide_feed",
    "hide_subs",
    "redirect_home",
];

/// Snapshot of the behavior-backing declarative flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagView {
    pub hide_autoplay: bool,
    pub hide_notifs: bool,
    pub hide_annotations: bool,
    pub hide_feed: bool,
    pub hide_subs: bool,
    pub redirect_home: bool,
}

impl FlagView {
    fn read(tree: &ObservedTree) -> Self {
        let root = tree.root();
        let on = |name: &str| tree.attribute(root, name).as_deref() == Some("true");
        Self {
            hide_autoplay: on("hide_autoplay"),
            hide_notifs: on("hide_notifs"),
            hide_annotations: on("hide_annotations"),
            hide_feed: on("hide_feed"),
            hide_subs: on("hide_subs"),
            redirect_home: on("redirect_home"),
        }
    }

    fn set(&mut self, name: &str, value: bool) {
        match name {
            "hide_autoplay" => self.hide_autoplay = value,
            "hide_notifs" => self.hide_notifs = value,
            "hide_annotations" => self.hide_annotations = value,
            "hide_feed" => self.hide_feed = value,
            "hide_subs" => self.hide_subs = value,
            "redirect_home" => self.redirect_home = value,
            _ => {}
        }
    }
}

/// Per-behavior mutable runtime state, one instance per loaded context.
/// Not persisted; everything starts unknown on (re)activation.
pub struct BehaviorRuntime {
    /// Lazy-init gate: `None` until the first reconciliation pass reads
    /// the declarative flags.
    flags: RwLock<Option<FlagView>>,

    pub(crate) autoplay_retry: Mutex<RetryState>,
    pub(crate) autoplay_watcher_armed: AtomicBool,

    pub(crate) annotation_retry: Mutex<RetryState>,
    pub(crate) annotation_watcher_armed: AtomicBool,
    pub(crate) annotation_menu_open: AtomicBool,

    pub(crate) title_watcher_running: AtomicBool,

    /// The home link's target before redirection, `Some` exactly while
    /// the redirect is active. Taken (once) on deactivation.
    pub(crate) nav_original_target: Mutex<Option<String>>,
    pub(crate) nav_watcher_armed: AtomicBool,
}

impl Default for BehaviorRuntime {
    fn default() -> Self {
        Self {
            flags: RwLock::new(None),
            autoplay_retry: Mutex::new(RetryState::Idle),
            autoplay_watcher_armed: AtomicBool::new(false),
            annotation_retry: Mutex::new(RetryState::Idle),
            annotation_watcher_armed: AtomicBool::new(false),
            annotation_menu_open: AtomicBool::new(false),
            title_watcher_running: AtomicBool::new(false),
            nav_original_target: Mutex::new(None),
            nav_watcher_armed: AtomicBool::new(false),
        }
    }
}

impl BehaviorRuntime {
    pub(crate) fn flags(&self) -> FlagView {
        self.flags.read().unwrap().unwrap_or_default()
    }

    pub(crate) fn flags_initialized(&self) -> bool {
        self.flags.read().unwrap().is_some()
    }

    fn init_flags_from(&self, tree: &ObservedTree) {
        let mut guard = self.flags.write().unwrap();
        if guard.is_none() {
            *guard = Some(FlagView::read(tree));
        }
    }

    fn update_flag(&self, name: &str, value: bool) {
        if let Some(view) = self.flags.write().unwrap().as_mut() {
            view.set(name, value);
        }
    }
}

/// The reconciliation engine: consumes declarative flags and keeps
/// re-asserting the five behaviors against the observed tree.
pub struct Reconciler {
    tree: ObservedTree,
    variant: PlatformVariant,
    runtime: Arc<BehaviorRuntime>,
    filter: ContentFilter,
    policy: Arc<RwLock<FilterPolicy>>,
}

impl Reconciler {
    pub fn new(tree: ObservedTree, variant: PlatformVariant, policy: Arc<RwLock<FilterPolicy>>) -> Self {
        Self {
            filter: ContentFilter::new(tree.clone()),
            tree,
            variant,
            runtime: Arc::new(BehaviorRuntime::default()),
            policy,
        }
    }

    pub fn tree(&self) -> &ObservedTree {
        &self.tree
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    /// One full reconciliation pass. Behaviors are independent: one
    /// finding its structure missing never prevents the others from
    /// running.
    pub fn reconcile_all(&self, phase: Phase) {
        self.runtime.init_flags_from(&self.tree);

        title::reconcile(&self.tree, &self.runtime, self.variant);
        autoplay::reconcile(&self.tree, &self.runtime, self.variant, phase);
        annotations::reconcile(&self.tree, &self.runtime, self.variant);
        navigation::reconcile(&self.tree, &self.runtime);
        self.run_filter();
    }

    /// Re-run only the content filter (the debounced path).
    pub fn run_filter(&self) {
        let policy = self.policy.read().unwrap().clone();
        self.filter.reconcile(self.tree.root(), &policy);
    }

    /// React to one declarative flag changing on the root. Re-runs only
    /// the behavior(s) backed by that flag, never a full pass. Ignored
    /// until the lazy-init gate has opened.
    pub fn on_flag_changed(&self, name: &str) {
        if !self.runtime.flags_initialized() {
            return;
        }
        let value = self.tree.attribute(self.tree.root(), name).as_deref() == Some("true");
        self.runtime.update_flag(name, value);

        match name {
            "hide_autoplay" if value => match self.variant {
                PlatformVariant::Desktop => autoplay::desktop(&self.tree, &self.runtime),
                PlatformVariant::Mobile => autoplay::mobile(&self.tree),
            },
            "hide_notifs" if value => title::reconcile(&self.tree, &self.runtime, self.variant),
            "hide_annotations" if value => {
                annotations::reconcile(&self.tree, &self.runtime, self.variant)
            }
            "hide_feed" | "hide_subs" | "redirect_home" => {
                navigation::reconcile(&self.tree, &self.runtime)
            }
            _ => {}
        }
    }
}
