//! Behavior reconciliation tests
//!
//! Drives the engine against a fake page whose owner keeps undoing the
//! engine's work, under a paused clock so retry delays are deterministic.

use qm_common::settings::BlockedIdentifierSet;
use qm_engine::behaviors::{Phase, PlatformVariant, Reconciler};
use qm_engine::filter::FilterPolicy;
use qm_engine::tree::{NodeId, ObservedTree};
use qm_engine::watcher::{arm_attribute_watcher, arm_listing_watcher};
use std::sync::{Arc, RwLock};
use std::time::Duration;

fn reconciler(tree: &ObservedTree, variant: PlatformVariant) -> Arc<Reconciler> {
    reconciler_with_policy(tree, variant, FilterPolicy::default())
}

fn reconciler_with_policy(
    tree: &ObservedTree,
    variant: PlatformVariant,
    policy: FilterPolicy,
) -> Arc<Reconciler> {
    Arc::new(Reconciler::new(
        tree.clone(),
        variant,
        Arc::new(RwLock::new(policy)),
    ))
}

fn set_flag(tree: &ObservedTree, name: &str) {
    tree.set_attribute(tree.root(), name, "true");
}

/// Watch page with the autostart toggle in the given state.
fn build_watch_page(tree: &ObservedTree, autoplay_on: bool) -> NodeId {
    let flexy = tree.create_element("ytd-watch-flexy");
    tree.append_child(tree.root(), flexy);
    let button = tree.create_element("button");
    tree.append_child(flexy, button);
    tree.set_attribute(button, "class", "ytp-autonav-toggle-button");
    tree.set_attribute(button, "aria-checked", if autoplay_on { "true" } else { "false" });
    button
}

#[tokio::test(start_paused = true)]
async fn autoplay_toggle_keeps_rewinning_the_tug_of_war() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_autoplay");
    let button = build_watch_page(&tree, true);

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.attribute(button, "aria-checked").as_deref(), Some("false"));
    assert_eq!(tree.activation_count(button), 1);

    // The owner re-enables it; the armed retry re-toggles after 1.5s
    tree.set_attribute(button, "aria-checked", "true");
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(tree.attribute(button, "aria-checked").as_deref(), Some("false"));
    assert_eq!(tree.activation_count(button), 2);

    // And again: there is no retry bound while the feature stays on
    tree.set_attribute(button, "aria-checked", "true");
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(tree.attribute(button, "aria-checked").as_deref(), Some("false"));
    assert_eq!(tree.activation_count(button), 3);
}

#[tokio::test(start_paused = true)]
async fn autoplay_retry_is_cancelled_only_by_the_flag() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_autoplay");
    let button = build_watch_page(&tree, true);

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.activation_count(button), 1);

    // Feature turned off before the next retry fires
    tree.remove_attribute(tree.root(), "hide_autoplay");
    rec.on_flag_changed("hide_autoplay");

    tree.set_attribute(button, "aria-checked", "true");
    tokio::time::sleep(Duration::from_millis(2000)).await;

    // The in-flight timer fired as a no-op
    assert_eq!(tree.attribute(button, "aria-checked").as_deref(), Some("true"));
    assert_eq!(tree.activation_count(button), 1);
}

#[tokio::test(start_paused = true)]
async fn autoplay_already_off_is_left_alone() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_autoplay");
    let button = build_watch_page(&tree, false);

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.activation_count(button), 0);
}

#[tokio::test(start_paused = true)]
async fn autoplay_waits_for_the_control_to_materialize() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_autoplay");

    // Watch container exists but the owner has not built its content yet
    let flexy = tree.create_element("ytd-watch-flexy");
    tree.append_child(tree.root(), flexy);

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);

    // The owner materializes the control, already on
    let button = tree.create_element("button");
    tree.set_attribute(button, "class", "ytp-autonav-toggle-button");
    tree.set_attribute(button, "aria-checked", "true");
    tree.append_child(flexy, button);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tree.attribute(button, "aria-checked").as_deref(), Some("false"));
    assert_eq!(tree.activation_count(button), 1);
}

#[tokio::test(start_paused = true)]
async fn hidden_watch_container_is_ignored() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_autoplay");
    let button = build_watch_page(&tree, true);
    let flexy = tree.find_first_by_tag(tree.root(), "ytd-watch-flexy").unwrap();
    tree.set_attribute(flexy, "hidden", "");

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.activation_count(button), 0);
}

#[tokio::test(start_paused = true)]
async fn mobile_autoplay_only_acts_after_load() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_autoplay");

    let container = tree.create_element("div");
    tree.append_child(tree.root(), container);
    tree.set_attribute(container, "id", "player-container-id");
    let player = tree.create_element("div");
    tree.append_child(tree.root(), player);
    tree.set_attribute(player, "id", "player");
    let toggle = tree.create_element("div");
    tree.append_child(tree.root(), toggle);
    tree.set_attribute(toggle, "class", "ytm-autonav-toggle-button-container");
    tree.set_attribute(toggle, "aria-pressed", "true");

    let rec = reconciler(&tree, PlatformVariant::Mobile);

    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.attribute(toggle, "aria-pressed").as_deref(), Some("true"));

    rec.reconcile_all(Phase::Loaded);
    assert_eq!(tree.attribute(toggle, "aria-pressed").as_deref(), Some("false"));
}

#[tokio::test(start_paused = true)]
async fn title_badge_is_stripped_and_restripped() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_notifs");
    let title = tree.create_element("title");
    tree.append_child(tree.root(), title);
    tree.set_text(title, "(3) Subscriptions - YouTube");

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.text(title), "Subscriptions - YouTube");

    // The owner rewrites the title with a new badge
    tree.set_text(title, "(12) Subscriptions - YouTube");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tree.text(title), "Subscriptions - YouTube");
}

#[tokio::test(start_paused = true)]
async fn title_watcher_disarms_once_the_flag_goes_off() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_notifs");
    let title = tree.create_element("title");
    tree.append_child(tree.root(), title);
    tree.set_text(title, "(3) Home");

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.text(title), "Home");

    tree.remove_attribute(tree.root(), "hide_notifs");
    rec.on_flag_changed("hide_notifs");

    tree.set_text(title, "(4) Home");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tree.text(title), "(4) Home");
}

#[tokio::test(start_paused = true)]
async fn home_link_redirect_activates_and_rewins() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_feed");
    set_flag(&tree, "redirect_home");
    let link = tree.create_element("a");
    tree.append_child(tree.root(), link);
    tree.set_attribute(link, "id", "logo");
    tree.set_attribute(link, "href", "/");

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.attribute(link, "href").as_deref(), Some("/feed/subscriptions"));

    // Activation is intercepted: the owner's router sees nothing
    tree.activate(link);
    assert_eq!(tree.take_pending_navigation(), None);

    // The owner reasserts the original target
    tree.set_attribute(link, "href", "/");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tree.attribute(link, "href").as_deref(), Some("/feed/subscriptions"));
}

#[tokio::test(start_paused = true)]
async fn home_link_redirect_deactivates_exactly_once() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_feed");
    set_flag(&tree, "redirect_home");
    let link = tree.create_element("a");
    tree.append_child(tree.root(), link);
    tree.set_attribute(link, "id", "logo");
    tree.set_attribute(link, "href", "/");

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.attribute(link, "href").as_deref(), Some("/feed/subscriptions"));

    // hide_subs joining the set deactivates the redirect
    set_flag(&tree, "hide_subs");
    rec.on_flag_changed("hide_subs");
    assert_eq!(tree.attribute(link, "href").as_deref(), Some("/"));

    // Navigation works again
    tree.activate(link);
    assert_eq!(tree.take_pending_navigation().as_deref(), Some("/"));

    // A second deactivation has nothing to restore
    rec.on_flag_changed("hide_subs");
    assert_eq!(tree.attribute(link, "href").as_deref(), Some("/"));

    // And the behavior re-arms cleanly afterwards
    tree.remove_attribute(tree.root(), "hide_subs");
    rec.on_flag_changed("hide_subs");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tree.attribute(link, "href").as_deref(), Some("/feed/subscriptions"));
}

#[tokio::test(start_paused = true)]
async fn annotations_toggle_through_the_lazy_settings_menu() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_annotations");

    let player = tree.create_element("div");
    tree.append_child(tree.root(), player);
    tree.set_attribute(player, "id", "movie_player");
    let settings = tree.create_element("button");
    tree.append_child(player, settings);
    tree.set_attribute(settings, "class", "ytp-settings-button");

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);

    // The engine opened the menu to force its content to materialize
    assert_eq!(tree.activation_count(settings), 1);

    // The player materializes the menu items
    let item = tree.create_element("div");
    tree.set_attribute(item, "class", "ytp-menuitem");
    tree.set_text(item, "Annotations");
    tree.set_attribute(item, "aria-checked", "true");
    tree.append_child(player, item);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tree.attribute(item, "aria-checked").as_deref(), Some("false"));
    // Menu closed again after the toggle
    assert_eq!(tree.activation_count(settings), 2);

    // Re-assertion also covers the menu item
    tree.set_attribute(item, "aria-checked", "true");
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(tree.attribute(item, "aria-checked").as_deref(), Some("false"));
}

#[tokio::test(start_paused = true)]
async fn missing_structures_never_block_other_behaviors() {
    let tree = ObservedTree::new();
    set_flag(&tree, "hide_autoplay");
    set_flag(&tree, "hide_annotations");
    set_flag(&tree, "hide_notifs");
    set_flag(&tree, "hide_feed");
    set_flag(&tree, "redirect_home");

    // Only the title exists; every other behavior finds nothing
    let title = tree.create_element("title");
    tree.append_child(tree.root(), title);
    tree.set_text(title, "(8) Home");

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.text(title), "Home");
}

#[tokio::test(start_paused = true)]
async fn attribute_watcher_dispatches_only_flagged_changes() {
    let tree = ObservedTree::new();
    let title = tree.create_element("title");
    tree.append_child(tree.root(), title);
    tree.set_text(title, "(2) Home");

    let rec = reconciler(&tree, PlatformVariant::Desktop);
    rec.reconcile_all(Phase::Activation);
    assert_eq!(tree.text(title), "(2) Home");

    arm_attribute_watcher(rec.clone());

    // An unrelated attribute does nothing
    tree.set_attribute(tree.root(), "lang", "en");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tree.text(title), "(2) Home");

    // The backing flag appearing re-runs just the title behavior
    set_flag(&tree, "hide_notifs");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tree.text(title), "Home");
}

#[tokio::test(start_paused = true)]
async fn listing_bursts_collapse_to_one_debounced_filter_pass() {
    let tree = ObservedTree::new();
    let policy = FilterPolicy {
        enabled: true,
        blocked: BlockedIdentifierSet::from_raw(["@foo"]),
    };
    let rec = reconciler_with_policy(&tree, PlatformVariant::Desktop, policy);
    rec.reconcile_all(Phase::Activation);

    arm_listing_watcher(rec.clone(), Duration::from_millis(100));

    // Infinite scroll adds a burst of items
    let mut items = Vec::new();
    for _ in 0..5 {
        let item = tree.create_element("ytd-video-renderer");
        let anchor = tree.create_element("a");
        tree.append_child(item, anchor);
        tree.set_attribute(anchor, "href", "/@foo");
        tree.append_child(tree.root(), item);
        items.push(item);
    }

    // Inside the window nothing has happened yet
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(items.iter().all(|i| !tree.is_display_hidden(*i)));

    // After the quiet interval, one pass hid the whole burst
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(items.iter().all(|i| tree.is_display_hidden(*i)));
    assert!(items.iter().all(|i| tree.has_blocked_marker(*i)));
}
