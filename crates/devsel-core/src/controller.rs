//! Selection controller: the single entry point for host events
//!
//! The controller owns the registry it was given, the derived hierarchy
//! index, and the selection tree plus keyword filter for the active type view.
//! Every mutation runs to completion (tree walk, selection export, visible
//! counts) before any [`SelectionEvent`] is sent, and a re-entrancy guard
//! rejects mutations that arrive while another one is still in progress.
//!
//! The exported selection is global across type views. A mutation inside
//! one view rewrites the membership of that view's selectable devices and
//! keeps every other selected ID as it was.

use indexmap::IndexSet;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::device::DeviceId;
use crate::filter::{VisibilityFilter, VisibleCounts};
use crate::hierarchy::{HierarchyIndex, TypeView};
use crate::registry::{DeviceRegistry, LoadError};
use crate::source::DeviceSource;
use crate::tree::{CheckState, NodeId, SelectionTree};

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Receiving end of the controller's event channel
pub type EventReceiver = broadcast::Receiver<SelectionEvent>;

/// Notification for host UI layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    /// The exported selection may have changed
    SelectionChanged(Vec<DeviceId>),
    /// The keyword filter changed
    SearchTextChanged(String),
    /// A registry load started (`true`) or finished (`false`)
    LoadingStateChanged(bool),
    /// The registry published a snapshot
    DataLoaded { devices: usize, types: usize },
    /// The registry failed to load; carries a human-readable message
    DataLoadError(String),
    /// The active type view was switched and the tree rebuilt
    ViewChanged(TypeView),
}

/// Coordinates registry, tree and filter behind one API
pub struct SelectionController {
    registry: DeviceRegistry,
    index: HierarchyIndex,
    tree: SelectionTree,
    filter: VisibilityFilter,
    view: TypeView,
    selected: IndexSet<DeviceId>,
    counts: VisibleCounts,
    updating: bool,
    events: broadcast::Sender<SelectionEvent>,
}

impl SelectionController {
    /// Create a controller around a registry
    ///
    /// If the registry is already loaded the tree for the all-devices view
    /// is built right away.
    pub fn new(registry: DeviceRegistry) -> Self {
        Self::with_capacity(registry, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a controller with a specific event channel capacity
    pub fn with_capacity(registry: DeviceRegistry, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let mut controller = Self {
            registry,
            index: HierarchyIndex::new(),
            tree: SelectionTree::new(),
            filter: VisibilityFilter::new(),
            view: TypeView::All,
            selected: IndexSet::new(),
            counts: VisibleCounts::default(),
            updating: false,
            events,
        };
        if controller.registry.is_loaded() {
            controller.on_data_loaded();
        }
        controller
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Load the registry from a source and build the active view
    ///
    /// A registry that is already loaded is left alone and no events are sent.
    pub fn load(&mut self, source: &dyn DeviceSource) -> Result<(), LoadError> {
        if self.registry.is_loaded() || self.registry.is_loading() {
            debug!("Registry already loaded, skipping");
            return Ok(());
        }

        self.emit(SelectionEvent::LoadingStateChanged(true));
        let result = self.registry.load(source);
        self.emit(SelectionEvent::LoadingStateChanged(false));

        match result {
            Ok(()) => {
                self.on_data_loaded();
                self.emit(SelectionEvent::DataLoaded {
                    devices: self.registry.len(),
                    types: self.registry.device_types().len(),
                });
                Ok(())
            }
            Err(e) => {
                let message = self
                    .registry
                    .last_error()
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string());
                self.emit(SelectionEvent::DataLoadError(message));
                Err(e)
            }
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn index(&self) -> &HierarchyIndex {
        &self.index
    }

    pub fn tree(&self) -> &SelectionTree {
        &self.tree
    }

    /// Tree interaction is only enabled once a snapshot is loaded
    pub fn is_interactive(&self) -> bool {
        self.registry.is_loaded()
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    pub fn device_type(&self) -> &TypeView {
        &self.view
    }

    pub fn search_text(&self) -> &str {
        self.filter.keyword()
    }

    /// The exported selection: checked non-group device IDs
    pub fn get_selected_devices(&self) -> Vec<DeviceId> {
        self.selected.iter().cloned().collect()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn is_selected(&self, device_id: &str) -> bool {
        self.selected.contains(device_id)
    }

    pub fn visible_counts(&self) -> VisibleCounts {
        self.counts
    }

    /// Aggregate "select all" checkbox state over the visible devices
    pub fn select_all_state(&self) -> CheckState {
        self.counts.select_all_state()
    }

    /// `false` drives the "no results" empty state
    pub fn has_visible_results(&self) -> bool {
        self.filter.has_results(&self.tree)
    }

    /// Replace the selection with the known non-group devices in `ids`
    pub fn set_selected_devices<I>(&mut self, ids: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        if !self.begin_update() {
            return;
        }

        let mut selected = IndexSet::new();
        for id in ids {
            let id = id.as_ref();
            if self.is_known_selectable(id) {
                selected.insert(DeviceId::from(id));
            } else {
                debug!(device = id, "Ignoring unknown or group device in selection");
            }
        }
        self.selected = selected;
        self.tree.apply_selection(&self.selected);
        self.sync_from_tree();
        self.refresh_counts();

        self.end_update();
        self.emit_selection();
    }

    /// Deselect everything
    pub fn clear_selection(&mut self) {
        self.set_selected_devices(std::iter::empty::<&str>());
    }

    /// Update the keyword filter
    pub fn set_search_text(&mut self, text: &str) {
        if text == self.filter.keyword() {
            return;
        }
        if !self.begin_update() {
            return;
        }

        self.filter.apply(&mut self.tree, text);
        self.refresh_counts();

        self.end_update();
        self.emit(SelectionEvent::SearchTextChanged(text.to_string()));
    }

    /// Check or uncheck every visible node; hidden nodes are left untouched
    pub fn toggle_select_all(&mut self, checked: bool) {
        if !self.begin_update() {
            return;
        }

        self.tree.set_visible(checked);
        self.sync_from_tree();
        self.refresh_counts();

        self.end_update();
        self.emit_selection();
    }

    /// Interactive toggle of one device
    ///
    /// Returns `false` (and changes nothing) when the device is not shown in
    /// the active view or another update is in progress.
    pub fn on_item_toggled(&mut self, device_id: &str, checked: bool) -> bool {
        if !self.begin_update() {
            return false;
        }

        let found = self.tree.set_by_id(device_id, checked);
        if found {
            self.sync_from_tree();
            self.refresh_counts();
        }

        self.end_update();
        if found {
            self.emit_selection();
        }
        found
    }

    /// Interactive toggle of one tree node
    ///
    /// Returns `false` for a node handle from an earlier tree.
    pub fn on_node_toggled(&mut self, node: NodeId, checked: bool) -> bool {
        if !self.begin_update() {
            return false;
        }

        let found = self.tree.toggle(node, checked);
        if found {
            self.sync_from_tree();
            self.refresh_counts();
        }

        self.end_update();
        if found {
            self.emit_selection();
        }
        found
    }

    /// Switch the active type view and rebuild the tree
    ///
    /// The selection and keyword carry over to the new view.
    pub fn set_device_type(&mut self, view: TypeView) {
        if view == self.view {
            return;
        }
        if !self.begin_update() {
            return;
        }

        info!(view = %view, "Switching device view");
        self.view = view.clone();
        self.rebuild_tree();

        self.end_update();
        self.emit(SelectionEvent::ViewChanged(view));
    }

    fn on_data_loaded(&mut self) {
        self.index = HierarchyIndex::build(&self.registry);

        // Drop anything selected before the data existed that is not selectable
        let selected = std::mem::take(&mut self.selected);
        self.selected = selected
            .into_iter()
            .filter(|id| self.is_known_selectable(id.as_str()))
            .collect();

        self.rebuild_tree();
    }

    fn rebuild_tree(&mut self) {
        self.tree = SelectionTree::build_with_selection(&self.index, &self.view, &self.selected);
        self.sync_from_tree();
        self.filter.refresh(&mut self.tree);
        self.refresh_counts();
    }

    /// Export the tree's checked devices, keeping selections outside the view
    fn sync_from_tree(&mut self) {
        let mut next: IndexSet<DeviceId> = self.tree.collect_selected().into_iter().collect();
        for id in &self.selected {
            if !self.tree.contains_selectable(id.as_str()) {
                next.insert(id.clone());
            }
        }
        self.selected = next;
    }

    fn refresh_counts(&mut self) {
        self.counts = self.filter.count_visible(&self.tree);
    }

    fn is_known_selectable(&self, id: &str) -> bool {
        if !self.registry.is_loaded() {
            return !id.is_empty();
        }
        self.registry.get(id).is_some_and(|d| !d.is_group)
    }

    fn begin_update(&mut self) -> bool {
        if self.updating {
            warn!("Ignoring re-entrant selection update");
            return false;
        }
        self.updating = true;
        true
    }

    fn end_update(&mut self) {
        self.updating = false;
    }

    fn emit_selection(&self) {
        self.emit(SelectionEvent::SelectionChanged(self.get_selected_devices()));
    }

    fn emit(&self, event: SelectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
