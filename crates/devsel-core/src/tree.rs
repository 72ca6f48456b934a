//! Tri-state selection tree for one type view
//!
//! Nodes live in a flat arena and refer to each other by [`NodeId`]; the
//! parent link is an index, so walking upward is O(1) per step without any
//! ownership cycle. The same device may occur more than once when the
//! hierarchy reconverges (two parents sharing a child), which is why lookups
//! by device ID return every matching node.
//!
//! After every public mutation each node with children satisfies:
//! Checked iff all children are Checked, Unchecked iff all are Unchecked,
//! PartiallyChecked otherwise.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::device::DeviceId;
use crate::hierarchy::{HierarchyIndex, TypeView};

/// Check status of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    #[default]
    Unchecked,
    PartiallyChecked,
    Checked,
}

impl CheckState {
    pub fn from_checked(checked: bool) -> Self {
        if checked {
            Self::Checked
        } else {
            Self::Unchecked
        }
    }

    pub fn is_checked(self) -> bool {
        self == Self::Checked
    }

    /// Combine child states; `None` for an empty set of children
    pub fn aggregate(states: impl IntoIterator<Item = CheckState>) -> Option<Self> {
        let mut any = false;
        let mut all_checked = true;
        let mut all_unchecked = true;
        for state in states {
            any = true;
            all_checked &= state == Self::Checked;
            all_unchecked &= state == Self::Unchecked;
        }
        match (any, all_checked, all_unchecked) {
            (false, _, _) => None,
            (true, true, _) => Some(Self::Checked),
            (true, _, true) => Some(Self::Unchecked),
            _ => Some(Self::PartiallyChecked),
        }
    }

    /// Tri-state of a counted selection: none, all, or some of `total`
    pub fn from_counts(selected: usize, total: usize) -> Self {
        if selected == 0 {
            Self::Unchecked
        } else if selected == total {
            Self::Checked
        } else {
            Self::PartiallyChecked
        }
    }
}

/// Handle to a node in one particular [`SelectionTree`]
///
/// Handles carry the generation of the tree that issued them, so a handle
/// kept across a rebuild is rejected instead of addressing an unrelated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    generation: u64,
    index: usize,
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// A node in the selection tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Device this node stands for
    pub device_id: DeviceId,
    /// Display name copied from the device
    pub name: String,
    /// Current check status
    pub state: CheckState,
    /// Whether checking this node exports its device ID
    pub selectable: bool,
    pub(crate) visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl TreeNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Visibility under the active keyword filter
    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

/// Mutable tri-state tree mirroring the hierarchy for one view
#[derive(Debug, Clone, Default)]
pub struct SelectionTree {
    generation: u64,
    view: TypeView,
    nodes: Vec<TreeNode>,
    roots: Vec<NodeId>,
    by_device: HashMap<DeviceId, Vec<NodeId>>,
}

impl SelectionTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an all-unchecked tree for a view
    pub fn build(index: &HierarchyIndex, view: &TypeView) -> Self {
        let members = index.members(view);
        let mut tree = Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            view: view.clone(),
            ..Self::default()
        };

        for root in index.roots_for_type(view) {
            let id = tree.add_subtree(index, view, &members, &root, None);
            tree.roots.push(id);
        }

        debug!(view = %view, nodes = tree.nodes.len(), "Built selection tree");
        tree
    }

    /// Build a tree whose selectable nodes listed in `selected` start checked
    pub fn build_with_selection(
        index: &HierarchyIndex,
        view: &TypeView,
        selected: &IndexSet<DeviceId>,
    ) -> Self {
        let mut tree = Self::build(index, view);
        tree.apply_selection(selected);
        tree
    }

    fn add_subtree(
        &mut self,
        index: &HierarchyIndex,
        view: &TypeView,
        members: &IndexSet<DeviceId>,
        device_id: &DeviceId,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId {
            generation: self.generation,
            index: self.nodes.len(),
        };
        let name = index
            .get(device_id.as_str())
            .map(|e| e.name.clone())
            .unwrap_or_default();
        self.nodes.push(TreeNode {
            device_id: device_id.clone(),
            name,
            state: CheckState::Unchecked,
            selectable: index.is_selectable(device_id.as_str(), view),
            visible: true,
            parent,
            children: Vec::new(),
        });
        self.by_device.entry(device_id.clone()).or_default().push(id);

        for child in index.children(device_id.as_str()) {
            if members.contains(child) {
                let child_id = self.add_subtree(index, view, members, child, Some(id));
                self.nodes[id.index].children.push(child_id);
            }
        }
        id
    }

    pub fn view(&self) -> &TypeView {
        &self.view
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Look up a node; `None` for a handle issued by another tree
    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        if id.generation != self.generation {
            return None;
        }
        self.nodes.get(id.index)
    }

    /// Every node standing for a device; empty when the device is not shown
    pub fn nodes_for(&self, device_id: &str) -> &[NodeId] {
        self.by_device
            .get(device_id)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.by_device.contains_key(device_id)
    }

    /// Whether the device is shown here as a selectable node
    pub fn contains_selectable(&self, device_id: &str) -> bool {
        self.nodes_for(device_id)
            .iter()
            .any(|&n| self.nodes[n.index].selectable)
    }

    /// State of the first node for a device
    pub fn state_of(&self, device_id: &str) -> Option<CheckState> {
        self.nodes_for(device_id)
            .first()
            .map(|&n| self.nodes[n.index].state)
    }

    /// Depth-first listing of `(depth, node)` in display order
    pub fn flatten(&self) -> Vec<(usize, NodeId)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, NodeId)> = self.roots.iter().rev().map(|&r| (0, r)).collect();
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            for &child in self.nodes[id.index].children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }

    /// Set a node and all its descendants, then recompute its ancestors
    ///
    /// Other nodes standing for the same devices follow along. Returns
    /// `false` for a handle this tree did not issue.
    pub fn toggle(&mut self, id: NodeId, checked: bool) -> bool {
        if self.node(id).is_none() {
            debug!(node = ?id, "Stale node handle, ignoring");
            return false;
        }
        for head in self.set_subtree(id, CheckState::from_checked(checked)) {
            self.propagate_up(head);
        }
        true
    }

    /// Toggle every node standing for a device
    ///
    /// Returns `false` when the device is not part of this tree.
    pub fn set_by_id(&mut self, device_id: &str, checked: bool) -> bool {
        match self.nodes_for(device_id).first() {
            Some(&id) => self.toggle(id, checked),
            None => {
                debug!(device = device_id, "Device not in selection tree, ignoring");
                false
            }
        }
    }

    /// Uncheck every node
    pub fn clear_all(&mut self) {
        for node in &mut self.nodes {
            node.state = CheckState::Unchecked;
        }
    }

    /// Reset states so exactly the selectable nodes listed in `selected`
    /// (with their descendants) are checked, ancestors recomputed
    pub fn apply_selection(&mut self, selected: &IndexSet<DeviceId>) {
        self.clear_all();
        for device_id in selected {
            let targets = self.nodes_for(device_id.as_str()).to_vec();
            for id in targets {
                if self.nodes[id.index].selectable {
                    self.set_subtree(id, CheckState::Checked);
                }
            }
        }
        self.recompute_all();
    }

    /// Apply a state to every visible node, leaving hidden ones untouched
    pub fn set_visible(&mut self, checked: bool) {
        let state = CheckState::from_checked(checked);
        let mut stack: Vec<NodeId> = self.roots.clone();
        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id.index];
            if !node.visible {
                continue;
            }
            node.state = state;
            stack.extend(node.children.iter().copied());
        }
        self.recompute_all();
    }

    /// Checked, selectable device IDs in depth-first order, de-duplicated
    pub fn collect_selected(&self) -> Vec<DeviceId> {
        let mut selected: IndexSet<DeviceId> = IndexSet::new();
        for (_, id) in self.flatten() {
            let node = &self.nodes[id.index];
            if node.selectable && node.state.is_checked() {
                selected.insert(node.device_id.clone());
            }
        }
        selected.into_iter().collect()
    }

    /// Check that every internal node agrees with its children
    pub fn is_consistent(&self) -> bool {
        self.nodes.iter().all(|node| {
            CheckState::aggregate(node.children.iter().map(|c| self.nodes[c.index].state))
                .map_or(true, |expected| expected == node.state)
        })
    }

    pub(crate) fn set_node_visible(&mut self, id: NodeId, visible: bool) {
        self.nodes[id.index].visible = visible;
    }

    /// Set a node's subtree and every other copy of the devices in it
    ///
    /// Returns the nodes whose parent was not set, where upward propagation
    /// has to start.
    fn set_subtree(&mut self, id: NodeId, state: CheckState) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let node = &mut self.nodes[current.index];
            node.state = state;
            stack.extend(node.children.iter().copied());
            if let Some(copies) = self.by_device.get(&node.device_id) {
                stack.extend(copies.iter().copied());
            }
        }

        seen.iter()
            .copied()
            .filter(|n| self.nodes[n.index].parent.map_or(true, |p| !seen.contains(&p)))
            .collect()
    }

    fn node_id(&self, index: usize) -> NodeId {
        NodeId {
            generation: self.generation,
            index,
        }
    }

    fn propagate_up(&mut self, id: NodeId) {
        let mut current = self.nodes[id.index].parent;
        while let Some(parent) = current {
            let Some(state) = self.aggregate_children(parent) else {
                break;
            };
            if self.nodes[parent.index].state == state {
                break;
            }
            self.nodes[parent.index].state = state;
            current = self.nodes[parent.index].parent;
        }
    }

    /// Recompute every internal node bottom-up
    fn recompute_all(&mut self) {
        // Children are always pushed after their parent, so reverse arena
        // order visits every child before its parent.
        for i in (0..self.nodes.len()).rev() {
            if let Some(state) = self.aggregate_children(self.node_id(i)) {
                self.nodes[i].state = state;
            }
        }
    }

    fn aggregate_children(&self, id: NodeId) -> Option<CheckState> {
        CheckState::aggregate(self.nodes[id.index].children.iter().map(|c| self.nodes[c.index].state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceSnapshot};
    use crate::registry::DeviceRegistry;
    use crate::source::SampleSource;

    fn index_for(source: &dyn crate::source::DeviceSource) -> HierarchyIndex {
        let mut registry = DeviceRegistry::new();
        registry.load(source).unwrap();
        HierarchyIndex::build(&registry)
    }

    fn sample_tree() -> SelectionTree {
        SelectionTree::build(&index_for(&SampleSource), &TypeView::All)
    }

    /// site(group) -> rack(group) -> {a, b}; site -> c
    fn nested_tree() -> SelectionTree {
        let snapshot = DeviceSnapshot::new(
            vec!["t".to_string()],
            vec![
                Device::group("site", "Site", "t"),
                Device::group("rack", "Rack", "t").with_parent("site"),
                Device::new("a", "A", "t").with_parent("rack"),
                Device::new("b", "B", "t").with_parent("rack"),
                Device::new("c", "C", "t").with_parent("site"),
            ],
        );
        SelectionTree::build(&index_for(&snapshot), &TypeView::All)
    }

    fn first(tree: &SelectionTree, id: &str) -> NodeId {
        tree.nodes_for(id)[0]
    }

    fn ids(list: Vec<DeviceId>) -> Vec<String> {
        list.into_iter().map(|d| d.0).collect()
    }

    #[test]
    fn test_aggregate() {
        use CheckState::*;
        assert_eq!(CheckState::aggregate(std::iter::empty()), None);
        assert_eq!(CheckState::aggregate([Checked, Checked]), Some(Checked));
        assert_eq!(CheckState::aggregate([Unchecked, Unchecked]), Some(Unchecked));
        assert_eq!(CheckState::aggregate([Checked, Unchecked]), Some(PartiallyChecked));
        assert_eq!(CheckState::aggregate([PartiallyChecked]), Some(PartiallyChecked));
    }

    #[test]
    fn test_from_counts() {
        assert_eq!(CheckState::from_counts(0, 0), CheckState::Unchecked);
        assert_eq!(CheckState::from_counts(0, 3), CheckState::Unchecked);
        assert_eq!(CheckState::from_counts(3, 3), CheckState::Checked);
        assert_eq!(CheckState::from_counts(1, 3), CheckState::PartiallyChecked);
    }

    #[test]
    fn test_build_sample_structure() {
        let tree = sample_tree();
        assert_eq!(tree.len(), 12);
        assert_eq!(tree.roots().len(), 3);

        let group = tree.node(first(&tree, "sensor_group")).unwrap();
        assert!(!group.selectable);
        assert_eq!(group.children().len(), 4);
        assert!(tree.node(first(&tree, "sensor_001")).unwrap().selectable);
        assert!(tree.collect_selected().is_empty());
    }

    #[test]
    fn test_build_for_type() {
        let index = index_for(&SampleSource);
        let tree = SelectionTree::build(&index, &TypeView::from_label("子模型"));
        assert_eq!(tree.len(), 4);
        assert!(tree.contains("child_003"));
        assert!(!tree.contains("root_001"));
    }

    #[test]
    fn test_toggle_leaf_updates_parent() {
        let mut tree = sample_tree();
        tree.toggle(first(&tree, "root_001"), true);
        assert_eq!(tree.state_of("root_group"), Some(CheckState::PartiallyChecked));

        tree.toggle(first(&tree, "root_002"), true);
        assert_eq!(tree.state_of("root_group"), Some(CheckState::Checked));

        tree.toggle(first(&tree, "root_001"), false);
        assert_eq!(tree.state_of("root_group"), Some(CheckState::PartiallyChecked));
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_toggle_group_cascades_through_nested_groups() {
        let mut tree = nested_tree();
        tree.toggle(first(&tree, "site"), true);
        for id in ["site", "rack", "a", "b", "c"] {
            assert_eq!(tree.state_of(id), Some(CheckState::Checked), "{}", id);
        }
        // Groups are structural only
        assert_eq!(ids(tree.collect_selected()), vec!["a", "b", "c"]);

        tree.toggle(first(&tree, "rack"), false);
        assert_eq!(tree.state_of("a"), Some(CheckState::Unchecked));
        assert_eq!(tree.state_of("site"), Some(CheckState::PartiallyChecked));
        assert_eq!(ids(tree.collect_selected()), vec!["c"]);
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_deep_partial_propagation() {
        let mut tree = nested_tree();
        tree.toggle(first(&tree, "a"), true);
        assert_eq!(tree.state_of("rack"), Some(CheckState::PartiallyChecked));
        assert_eq!(tree.state_of("site"), Some(CheckState::PartiallyChecked));

        tree.toggle(first(&tree, "b"), true);
        assert_eq!(tree.state_of("rack"), Some(CheckState::Checked));
        assert_eq!(tree.state_of("site"), Some(CheckState::PartiallyChecked));

        tree.toggle(first(&tree, "c"), true);
        assert_eq!(tree.state_of("site"), Some(CheckState::Checked));
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_set_by_unknown_id_is_noop() {
        let mut tree = sample_tree();
        assert!(!tree.set_by_id("ghost", true));
        assert!(tree.collect_selected().is_empty());
        assert!(tree.set_by_id("child_002", true));
        assert_eq!(ids(tree.collect_selected()), vec!["child_002"]);
    }

    #[test]
    fn test_empty_group_uses_leaf_semantics() {
        let snapshot = DeviceSnapshot::new(
            vec!["t".to_string()],
            vec![Device::group("g", "G", "t")],
        );
        let mut tree = SelectionTree::build(&index_for(&snapshot), &TypeView::All);
        tree.toggle(first(&tree, "g"), true);
        assert_eq!(tree.state_of("g"), Some(CheckState::Checked));
        assert!(tree.collect_selected().is_empty());
    }

    #[test]
    fn test_apply_selection_recomputes_parents() {
        let index = index_for(&SampleSource);
        let selected: IndexSet<DeviceId> = ["root_001", "sensor_group", "ghost"]
            .into_iter()
            .map(DeviceId::from)
            .collect();
        let tree = SelectionTree::build_with_selection(&index, &TypeView::All, &selected);

        assert_eq!(tree.state_of("root_001"), Some(CheckState::Checked));
        assert_eq!(tree.state_of("root_group"), Some(CheckState::PartiallyChecked));
        // Group IDs in the list are not selectable and change nothing
        assert_eq!(tree.state_of("sensor_group"), Some(CheckState::Unchecked));
        assert_eq!(ids(tree.collect_selected()), vec!["root_001"]);
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_clear_all() {
        let mut tree = nested_tree();
        tree.toggle(first(&tree, "site"), true);
        tree.clear_all();
        assert!(tree.collect_selected().is_empty());
        assert_eq!(tree.state_of("site"), Some(CheckState::Unchecked));
    }

    #[test]
    fn test_set_visible_skips_hidden_nodes() {
        let mut tree = nested_tree();
        let hidden = first(&tree, "b");
        tree.set_node_visible(hidden, false);

        tree.set_visible(true);
        assert_eq!(tree.state_of("a"), Some(CheckState::Checked));
        assert_eq!(tree.state_of("b"), Some(CheckState::Unchecked));
        assert_eq!(tree.state_of("rack"), Some(CheckState::PartiallyChecked));
        assert_eq!(tree.state_of("site"), Some(CheckState::PartiallyChecked));
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_shared_child_appears_under_both_parents() {
        let mut b = Device::group("b", "B", "t");
        b.children = vec![DeviceId::from("d")];
        let mut c = Device::group("c", "C", "t");
        c.children = vec![DeviceId::from("d")];
        let d = Device::new("d", "D", "t");
        let snapshot = DeviceSnapshot::new(vec!["t".to_string()], vec![b, c, d]);

        let mut tree = SelectionTree::build(&index_for(&snapshot), &TypeView::All);
        assert_eq!(tree.nodes_for("d").len(), 2);

        tree.set_by_id("d", true);
        assert_eq!(tree.state_of("b"), Some(CheckState::Checked));
        assert_eq!(tree.state_of("c"), Some(CheckState::Checked));
        assert_eq!(ids(tree.collect_selected()), vec!["d"]);
    }

    #[test]
    fn test_handle_from_rebuilt_tree_is_rejected() {
        let index = index_for(&SampleSource);
        let old = SelectionTree::build(&index, &TypeView::All);
        let handle = first(&old, "sensor_004");

        let mut tree = SelectionTree::build(&index, &TypeView::from_label("子模型"));
        assert!(tree.node(handle).is_none());
        assert!(!tree.toggle(handle, true));
        assert!(tree.collect_selected().is_empty());

        // Same shape, new generation
        let mut rebuilt = SelectionTree::build(&index, &TypeView::All);
        assert!(!rebuilt.toggle(handle, true));
    }

    #[test]
    fn test_group_toggle_reaches_copies_under_other_parents() {
        let mut b = Device::group("b", "B", "t");
        b.children = vec![DeviceId::from("d")];
        let mut c = Device::group("c", "C", "t");
        c.children = vec![DeviceId::from("d")];
        let snapshot =
            DeviceSnapshot::new(vec!["t".to_string()], vec![b, c, Device::new("d", "D", "t")]);

        let mut tree = SelectionTree::build(&index_for(&snapshot), &TypeView::All);
        assert!(tree.toggle(first(&tree, "b"), true));
        for &node in tree.nodes_for("d") {
            assert_eq!(tree.node(node).unwrap().state, CheckState::Checked);
        }
        assert_eq!(tree.state_of("c"), Some(CheckState::Checked));
        assert!(tree.is_consistent());
    }

    #[test]
    fn test_flatten_order() {
        let tree = nested_tree();
        let order: Vec<_> = tree
            .flatten()
            .into_iter()
            .map(|(depth, id)| (depth, tree.node(id).unwrap().device_id.as_str().to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "site".to_string()),
                (1, "rack".to_string()),
                (2, "a".to_string()),
                (2, "b".to_string()),
                (1, "c".to_string()),
            ]
        );
    }
}
