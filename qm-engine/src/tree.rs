//! Observed tree model
//!
//! The externally-owned, continuously mutating content structure the
//! engine reads and selectively modifies but does not construct. Nodes
//! carry a tag, attributes, text, a display-hidden state, and the
//! filter's blocked marker. Every structural or attribute mutation is
//! broadcast in order to subscribers; batches coalesce on the receiver
//! side.
//!
//! Activating a node models the page's own control handlers: a node with
//! an `aria-checked`/`aria-pressed` attribute flips it, and activating a
//! link records a pending navigation unless an interception is installed.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Handle to a node in the observed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One change notification. Delivered in mutation order.
#[derive(Debug, Clone)]
pub enum MutationRecord {
    ChildAdded { parent: NodeId, node: NodeId },
    ChildRemoved { parent: NodeId, node: NodeId },
    AttributeChanged { node: NodeId, name: String },
    TextChanged { node: NodeId },
    Activated { node: NodeId },
}

#[derive(Debug, Default)]
struct NodeData {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attrs: BTreeMap<String, String>,
    text: String,
    display_hidden: bool,
    blocked_marker: bool,
    intercepted: bool,
    activations: u32,
    alive: bool,
}

struct TreeInner {
    nodes: Vec<NodeData>,
    pending_navigation: Option<String>,
    mutation_seq: u64,
}

/// Shared handle to the observed tree.
#[derive(Clone)]
pub struct ObservedTree {
    inner: Arc<RwLock<TreeInner>>,
    mutation_tx: broadcast::Sender<MutationRecord>,
}

impl ObservedTree {
    /// Create a tree with a root element (the flag surface).
    pub fn new() -> Self {
        let (mutation_tx, _) = broadcast::channel(256);
        let root = NodeData {
            tag: "html".to_string(),
            alive: true,
            ..NodeData::default()
        };
        Self {
            inner: Arc::new(RwLock::new(TreeInner {
                nodes: vec![root],
                pending_navigation: None,
                mutation_seq: 0,
            })),
            mutation_tx,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Subscribe to the ordered mutation stream.
    pub fn subscribe(&self) -> broadcast::Receiver<MutationRecord> {
        self.mutation_tx.subscribe()
    }

    /// Total number of applied mutations. No-op writes do not count.
    pub fn mutation_count(&self) -> u64 {
        self.inner.read().unwrap().mutation_seq
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let mut inner = self.inner.write().unwrap();
        let id = NodeId(inner.nodes.len());
        inner.nodes.push(NodeData {
            tag: tag.to_string(),
            alive: true,
            ..NodeData::default()
        });
        id
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.nodes[child.0].parent = Some(parent);
            inner.nodes[parent.0].children.push(child);
            inner.mutation_seq += 1;
        }
        self.emit(MutationRecord::ChildAdded { parent, node: child });
    }

    /// Detach a node and mark its subtree gone.
    pub fn remove_node(&self, node: NodeId) {
        let parent = {
            let mut inner = self.inner.write().unwrap();
            let parent = inner.nodes[node.0].parent.take();
            if let Some(p) = parent {
                inner.nodes[p.0].children.retain(|c| *c != node);
            }
            let mut stack = vec![node];
            while let Some(n) = stack.pop() {
                inner.nodes[n.0].alive = false;
                stack.extend(inner.nodes[n.0].children.clone());
            }
            inner.mutation_seq += 1;
            parent
        };
        if let Some(parent) = parent {
            self.emit(MutationRecord::ChildRemoved { parent, node });
        }
    }

    pub fn tag(&self, node: NodeId) -> String {
        self.inner.read().unwrap().nodes[node.0].tag.clone()
    }

    pub fn is_alive(&self, node: NodeId) -> bool {
        self.inner.read().unwrap().nodes[node.0].alive
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner.read().unwrap().nodes[node.0].attrs.get(name).cloned()
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.inner.read().unwrap().nodes[node.0].attrs.contains_key(name)
    }

    /// Set an attribute. A write that does not change the value is a no-op
    /// and emits nothing.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        {
            let mut inner = self.inner.write().unwrap();
            let attrs = &mut inner.nodes[node.0].attrs;
            if attrs.get(name).map(String::as_str) == Some(value) {
                return;
            }
            attrs.insert(name.to_string(), value.to_string());
            inner.mutation_seq += 1;
        }
        self.emit(MutationRecord::AttributeChanged {
            node,
            name: name.to_string(),
        });
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        {
            let mut inner = self.inner.write().unwrap();
            if inner.nodes[node.0].attrs.remove(name).is_none() {
                return;
            }
            inner.mutation_seq += 1;
        }
        self.emit(MutationRecord::AttributeChanged {
            node,
            name: name.to_string(),
        });
    }

    pub fn text(&self, node: NodeId) -> String {
        self.inner.read().unwrap().nodes[node.0].text.clone()
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        {
            let mut inner = self.inner.write().unwrap();
            if inner.nodes[node.0].text == text {
                return;
            }
            inner.nodes[node.0].text = text.to_string();
            inner.mutation_seq += 1;
        }
        self.emit(MutationRecord::TextChanged { node });
    }

    /// Hide a node from display (the filter's suppression mechanism).
    pub fn hide(&self, node: NodeId) {
        let mut inner = self.inner.write().unwrap();
        if !inner.nodes[node.0].display_hidden {
            inner.nodes[node.0].display_hidden = true;
            inner.mutation_seq += 1;
        }
    }

    /// Restore a hidden node's visibility.
    pub fn restore(&self, node: NodeId) {
        let mut inner = self.inner.write().unwrap();
        if inner.nodes[node.0].display_hidden {
            inner.nodes[node.0].display_hidden = false;
            inner.mutation_seq += 1;
        }
    }

    pub fn is_display_hidden(&self, node: NodeId) -> bool {
        self.inner.read().unwrap().nodes[node.0].display_hidden
    }

    pub fn set_blocked_marker(&self, node: NodeId, marked: bool) {
        let mut inner = self.inner.write().unwrap();
        if inner.nodes[node.0].blocked_marker != marked {
            inner.nodes[node.0].blocked_marker = marked;
            inner.mutation_seq += 1;
        }
    }

    pub fn has_blocked_marker(&self, node: NodeId) -> bool {
        self.inner.read().unwrap().nodes[node.0].blocked_marker
    }

    /// Install or remove an activation interception on a link.
    pub fn set_activation_intercepted(&self, node: NodeId, intercepted: bool) {
        self.inner.write().unwrap().nodes[node.0].intercepted = intercepted;
    }

    pub fn is_activation_intercepted(&self, node: NodeId) -> bool {
        self.inner.read().unwrap().nodes[node.0].intercepted
    }

    /// Activate a node the way a user gesture would.
    ///
    /// Toggle controls flip their checked/pressed state; links record a
    /// pending navigation unless intercepted.
    pub fn activate(&self, node: NodeId) {
        let mut flipped: Option<String> = None;
        {
            let mut inner = self.inner.write().unwrap();
            let data = &mut inner.nodes[node.0];
            data.activations += 1;
            for name in ["aria-checked", "aria-pressed"] {
                if let Some(current) = data.attrs.get(name) {
                    let next = if current == "true" { "false" } else { "true" };
                    data.attrs.insert(name.to_string(), next.to_string());
                    flipped = Some(name.to_string());
                    break;
                }
            }
            if data.tag == "a" && !data.intercepted {
                if let Some(href) = data.attrs.get("href").cloned() {
                    inner.pending_navigation = Some(href);
                }
            }
            inner.mutation_seq += 1;
        }
        if let Some(name) = flipped {
            self.emit(MutationRecord::AttributeChanged { node, name });
        }
        self.emit(MutationRecord::Activated { node });
    }

    pub fn activation_count(&self, node: NodeId) -> u32 {
        self.inner.read().unwrap().nodes[node.0].activations
    }

    /// Navigation recorded by the last un-intercepted link activation.
    pub fn take_pending_navigation(&self) -> Option<String> {
        self.inner.write().unwrap().pending_navigation.take()
    }

    /// All live nodes of `scope`'s subtree in document order, excluding
    /// `scope` itself.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let inner = self.inner.read().unwrap();
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = inner.nodes[scope.0].children.iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            if inner.nodes[n.0].alive {
                out.push(n);
                stack.extend(inner.nodes[n.0].children.iter().rev().copied());
            }
        }
        out
    }

    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let inner = self.inner.read().unwrap();
        let mut current = inner.nodes[node.0].parent;
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = inner.nodes[n.0].parent;
        }
        false
    }

    pub fn find_by_tag(&self, scope: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|n| self.inner.read().unwrap().nodes[n.0].tag == tag)
            .collect()
    }

    pub fn find_first_by_tag(&self, scope: NodeId, tag: &str) -> Option<NodeId> {
        self.find_by_tag(scope, tag).into_iter().next()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.inner.read().unwrap().nodes[node.0]
            .attrs
            .get("class")
            .is_some_and(|c| c.split_whitespace().any(|part| part == class))
    }

    pub fn find_by_class(&self, scope: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|n| self.has_class(*n, class))
            .collect()
    }

    pub fn find_first_by_class(&self, scope: NodeId, class: &str) -> Option<NodeId> {
        self.find_by_class(scope, class).into_iter().next()
    }

    /// Find a live node by its `id` attribute.
    pub fn get_by_id(&self, id: &str) -> Option<NodeId> {
        let inner = self.inner.read().unwrap();
        inner
            .nodes
            .iter()
            .enumerate()
            .find(|(_, data)| data.alive && data.attrs.get("id").map(String::as_str) == Some(id))
            .map(|(index, _)| NodeId(index))
    }

    fn emit(&self, record: MutationRecord) {
        // No subscribers is OK
        let _ = self.mutation_tx.send(record);
    }
}

impl Default for ObservedTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_writes_are_observable_and_deduplicated() {
        let tree = ObservedTree::new();
        let mut rx = tree.subscribe();
        let root = tree.root();

        tree.set_attribute(root, "hide_feed", "true");
        assert!(matches!(
            rx.try_recv().unwrap(),
            MutationRecord::AttributeChanged { .. }
        ));

        let before = tree.mutation_count();
        tree.set_attribute(root, "hide_feed", "true");
        assert_eq!(tree.mutation_count(), before);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn activation_flips_toggle_state() {
        let tree = ObservedTree::new();
        let button = tree.create_element("button");
        tree.append_child(tree.root(), button);
        tree.set_attribute(button, "aria-checked", "true");

        tree.activate(button);
        assert_eq!(tree.attribute(button, "aria-checked").as_deref(), Some("false"));
        assert_eq!(tree.activation_count(button), 1);

        tree.activate(button);
        assert_eq!(tree.attribute(button, "aria-checked").as_deref(), Some("true"));
    }

    #[test]
    fn link_activation_navigates_unless_intercepted() {
        let tree = ObservedTree::new();
        let link = tree.create_element("a");
        tree.append_child(tree.root(), link);
        tree.set_attribute(link, "href", "/");

        tree.activate(link);
        assert_eq!(tree.take_pending_navigation().as_deref(), Some("/"));

        tree.set_activation_intercepted(link, true);
        tree.activate(link);
        assert_eq!(tree.take_pending_navigation(), None);
    }

    #[test]
    fn removed_subtrees_disappear_from_queries() {
        let tree = ObservedTree::new();
        let section = tree.create_element("section");
        let item = tree.create_element("ytd-video-renderer");
        tree.append_child(tree.root(), section);
        tree.append_child(section, item);

        assert_eq!(tree.find_by_tag(tree.root(), "ytd-video-renderer").len(), 1);
        tree.remove_node(section);
        assert!(tree.find_by_tag(tree.root(), "ytd-video-renderer").is_empty());
        assert!(!tree.is_alive(item));
    }

    #[test]
    fn descendant_relationship() {
        let tree = ObservedTree::new();
        let outer = tree.create_element("div");
        let inner = tree.create_element("span");
        tree.append_child(tree.root(), outer);
        tree.append_child(outer, inner);

        assert!(tree.is_descendant_of(inner, outer));
        assert!(tree.is_descendant_of(inner, tree.root()));
        assert!(!tree.is_descendant_of(outer, inner));
    }
}
