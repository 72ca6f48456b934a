//! Keyword filtering over a selection tree
//!
//! A node is visible when its own name or ID contains the keyword
//! (case-insensitive) or when any descendant is visible, so the ancestors of
//! a deep match stay on screen. Counting is a separate pass that only runs
//! once visibility has settled.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tree::{CheckState, SelectionTree};

/// Selectable devices currently on screen, and how many of them are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisibleCounts {
    pub total: usize,
    pub selected: usize,
}

impl VisibleCounts {
    /// State of the aggregate "select all" checkbox
    pub fn select_all_state(&self) -> CheckState {
        CheckState::from_counts(self.selected, self.total)
    }
}

/// Active keyword filter
#[derive(Debug, Clone, Default)]
pub struct VisibilityFilter {
    keyword: String,
    needle: String,
}

impl VisibilityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The keyword as entered
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn is_active(&self) -> bool {
        !self.needle.is_empty()
    }

    /// Set the keyword and re-mark the tree
    pub fn apply(&mut self, tree: &mut SelectionTree, keyword: &str) {
        self.keyword = keyword.to_string();
        self.needle = keyword.to_lowercase();
        self.refresh(tree);
    }

    /// Re-mark every node of the tree against the current keyword
    pub fn refresh(&self, tree: &mut SelectionTree) {
        // Reversed pre-order visits every descendant before its ancestor
        let order = tree.flatten();
        let mut visible = vec![false; order.len()];
        let position: std::collections::HashMap<_, _> =
            order.iter().enumerate().map(|(i, &(_, id))| (id, i)).collect();

        for (i, &(_, id)) in order.iter().enumerate().rev() {
            let Some(node) = tree.node(id) else {
                continue;
            };
            let matches = self.matches(&node.name, node.device_id.as_str());
            visible[i] = matches
                || node
                    .children()
                    .iter()
                    .any(|child| position.get(child).is_some_and(|&p| visible[p]));
        }

        for (i, &(_, id)) in order.iter().enumerate() {
            tree.set_node_visible(id, visible[i]);
        }

        debug!(
            keyword = %self.keyword,
            visible = visible.iter().filter(|v| **v).count(),
            nodes = order.len(),
            "Applied device filter"
        );
    }

    /// Count visible selectable nodes and how many of them are checked
    pub fn count_visible(&self, tree: &SelectionTree) -> VisibleCounts {
        let mut counts = VisibleCounts::default();
        for (_, id) in tree.flatten() {
            let Some(node) = tree.node(id) else {
                continue;
            };
            if node.is_visible() && node.selectable {
                counts.total += 1;
                if node.state.is_checked() {
                    counts.selected += 1;
                }
            }
        }
        counts
    }

    /// Whether any top-level node is visible
    pub fn has_results(&self, tree: &SelectionTree) -> bool {
        tree.roots()
            .iter()
            .any(|&r| tree.node(r).is_some_and(|n| n.is_visible()))
    }

    fn matches(&self, name: &str, id: &str) -> bool {
        self.needle.is_empty()
            || name.to_lowercase().contains(&self.needle)
            || id.to_lowercase().contains(&self.needle)
    }
}
