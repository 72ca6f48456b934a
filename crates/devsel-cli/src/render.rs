//! Text rendering of the selection tree and status line

use devsel_core::{CheckState, SelectionController};
use std::fmt::Write;

fn marker(state: CheckState) -> &'static str {
    match state {
        CheckState::Checked => "[x]",
        CheckState::PartiallyChecked => "[-]",
        CheckState::Unchecked => "[ ]",
    }
}

/// Render visible nodes, indented by depth
pub fn render_tree(controller: &SelectionController) -> String {
    let mut out = String::new();
    if !controller.is_interactive() {
        let message = controller
            .registry()
            .last_error()
            .unwrap_or("Device data not loaded");
        let _ = writeln!(out, "Error: {}", message);
        return out;
    }

    let tree = controller.tree();
    if !controller.has_visible_results() {
        let _ = writeln!(out, "No matching devices");
        return out;
    }

    for (depth, id) in tree.flatten() {
        let Some(node) = tree.node(id).filter(|n| n.is_visible()) else {
            continue;
        };
        let _ = writeln!(
            out,
            "{}{} {} ({})",
            "  ".repeat(depth),
            marker(node.state),
            node.name,
            node.device_id
        );
    }
    out
}

/// One-line summary: selection count and the select-all checkbox
pub fn render_status(controller: &SelectionController) -> String {
    let counts = controller.visible_counts();
    format!(
        "Selected: {} devices | {} all ({}/{} visible) | tab: {}",
        controller.selected_count(),
        marker(controller.select_all_state()),
        counts.selected,
        counts.total,
        controller.device_type()
    )
}

/// Render the type tabs, marking the active one
pub fn render_tabs(controller: &SelectionController) -> String {
    let active = controller.device_type().label();
    controller
        .registry()
        .view_tabs()
        .iter()
        .map(|tab| {
            if tab == active {
                format!("*{}*", tab)
            } else {
                tab.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}
