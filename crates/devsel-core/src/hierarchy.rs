//! Read-only hierarchy lookups derived from a loaded registry

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::device::{Device, DeviceId};
use crate::registry::DeviceRegistry;
use crate::source::ALL_DEVICES_TYPE;

/// Which devices a selection tree shows
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeView {
    /// Every device, regardless of type
    #[default]
    All,
    /// Devices of a single type, plus their ancestors for context
    Type(String),
}

impl TypeView {
    /// Map a tab label to a view; empty or the all-devices label mean [`TypeView::All`]
    pub fn from_label(label: &str) -> Self {
        if label.is_empty() || label == ALL_DEVICES_TYPE {
            Self::All
        } else {
            Self::Type(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::All => ALL_DEVICES_TYPE,
            Self::Type(t) => t,
        }
    }

    /// The type filter as the registry understands it (empty = all)
    pub fn type_filter(&self) -> &str {
        match self {
            Self::All => "",
            Self::Type(t) => t,
        }
    }

    fn includes(&self, device_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Type(t) => t == device_type,
        }
    }
}

impl std::fmt::Display for TypeView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Per-device entry of the index
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub name: String,
    pub device_type: String,
    pub is_group: bool,
    pub parents: Vec<DeviceId>,
    pub children: Vec<DeviceId>,
}

/// Children-by-parent and roots-by-type lookups over a registry snapshot
#[derive(Debug, Clone, Default)]
pub struct HierarchyIndex {
    entries: IndexMap<DeviceId, IndexEntry>,
}

impl HierarchyIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from a registry, in load order
    pub fn build(registry: &DeviceRegistry) -> Self {
        let mut entries: IndexMap<DeviceId, IndexEntry> = registry
            .all_devices()
            .map(|d| (d.id.clone(), IndexEntry::from_device(d)))
            .collect();

        // Reverse edges come from the (already linked) child lists
        let edges: Vec<(DeviceId, DeviceId)> = entries
            .iter()
            .flat_map(|(id, e)| e.children.iter().map(move |c| (c.clone(), id.clone())))
            .collect();
        for (child, parent) in edges {
            if let Some(entry) = entries.get_mut(&child) {
                if !entry.parents.contains(&parent) {
                    entry.parents.push(parent);
                }
            }
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Children of a device in load order; empty for unknown IDs
    pub fn children(&self, id: &str) -> &[DeviceId] {
        self.entries
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
    }

    /// Parents of a device; empty for roots and unknown IDs
    pub fn parents(&self, id: &str) -> &[DeviceId] {
        self.entries
            .get(id)
            .map(|e| e.parents.as_slice())
            .unwrap_or_default()
    }

    pub fn is_group(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(|e| e.is_group)
    }

    /// Devices with no parent, in load order
    pub fn roots(&self) -> Vec<&DeviceId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.parents.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// Devices a view matches directly
    pub fn matching<'a>(&'a self, view: &'a TypeView) -> impl Iterator<Item = &'a DeviceId> + 'a {
        self.entries
            .iter()
            .filter(move |(_, e)| view.includes(&e.device_type))
            .map(|(id, _)| id)
    }

    /// Every device a view shows: its matches plus all of their ancestors,
    /// in load order
    pub fn members(&self, view: &TypeView) -> IndexSet<DeviceId> {
        let mut wanted: HashSet<&DeviceId> = HashSet::new();
        let mut stack: Vec<&DeviceId> = self.matching(view).collect();
        while let Some(id) = stack.pop() {
            if wanted.insert(id) {
                stack.extend(self.parents(id.as_str()));
            }
        }

        self.entries
            .keys()
            .filter(|id| wanted.contains(id))
            .cloned()
            .collect()
    }

    /// Top-level devices of a view, in load order
    pub fn roots_for_type(&self, view: &TypeView) -> Vec<DeviceId> {
        let members = self.members(view);
        members
            .iter()
            .filter(|id| {
                !self
                    .parents(id.as_str())
                    .iter()
                    .any(|p| members.contains(p))
            })
            .cloned()
            .collect()
    }

    /// Whether a device is selectable within a view: it must be a non-group
    /// device the view matches directly
    pub fn is_selectable(&self, id: &str, view: &TypeView) -> bool {
        self.entries
            .get(id)
            .is_some_and(|e| !e.is_group && view.includes(&e.device_type))
    }
}

impl IndexEntry {
    fn from_device(device: &Device) -> Self {
        Self {
            name: device.name.clone(),
            device_type: device.device_type.clone(),
            is_group: device.is_group,
            parents: Vec::new(),
            children: device.children.clone(),
        }
    }
}
