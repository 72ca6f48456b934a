//! Authoritative device store
//!
//! The registry is populated once per session from a [`DeviceSource`]. Loading
//! links parent/child edges and validates the resulting graph; the snapshot is
//! published only when every check passes, so a failed load leaves the
//! registry empty and ready for another attempt.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::device::{Device, DeviceId};
use crate::source::{DeviceSource, SourceError, ALL_DEVICES_TYPE};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No device data available")]
    Empty,
    #[error("No device types defined")]
    NoTypes,
    #[error("Device at position {index} has an empty id or name")]
    InvalidDevice { index: usize },
    #[error("Device {0} is defined more than once")]
    DuplicateDevice(DeviceId),
    #[error("Device {device} references non-existent parent {parent}")]
    MissingParent { device: DeviceId, parent: DeviceId },
    #[error("Device {device} references non-existent child {child}")]
    MissingChild { device: DeviceId, child: DeviceId },
    #[error("Circular reference detected in device hierarchy starting from {0}")]
    Cycle(DeviceId),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Lifecycle of the registry snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    /// Nothing loaded yet
    #[default]
    Unloaded,
    /// A load is in progress
    Loading,
    /// Snapshot published
    Loaded,
    /// Last load attempt failed; may be retried
    Error,
}

/// Flat device store with hierarchy edges and the device-type catalog
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: IndexMap<DeviceId, Device>,
    types: Vec<String>,
    status: LoadStatus,
    last_error: Option<String>,
}

impl DeviceRegistry {
    /// Create an empty, unloaded registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the device catalog from a source
    ///
    /// Calling this while a snapshot is loaded (or loading) does nothing. After
    /// a failure the registry stays empty and the call can be repeated.
    pub fn load(&mut self, source: &dyn DeviceSource) -> Result<(), LoadError> {
        if matches!(self.status, LoadStatus::Loaded | LoadStatus::Loading) {
            debug!(status = ?self.status, "Device data already loaded, skipping");
            return Ok(());
        }

        self.status = LoadStatus::Loading;
        self.last_error = None;
        self.devices.clear();
        self.types.clear();

        match build_snapshot(source) {
            Ok((devices, types)) => {
                self.devices = devices;
                self.types = types;
                self.status = LoadStatus::Loaded;
                info!(
                    devices = self.devices.len(),
                    types = self.types.len(),
                    "Device data loaded"
                );
                Ok(())
            }
            Err(e) => {
                self.status = LoadStatus::Error;
                self.last_error = Some(format!("Failed to load device data: {}", e));
                warn!(error = %e, "Device data loading failed");
                Err(e)
            }
        }
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn is_loaded(&self) -> bool {
        self.status == LoadStatus::Loaded
    }

    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    /// Human-readable message of the last failed load
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Declared device types, in declaration order
    pub fn device_types(&self) -> &[String] {
        &self.types
    }

    /// Tab labels for a type picker: the all-devices tab first, then every
    /// other declared type
    pub fn view_tabs(&self) -> Vec<String> {
        std::iter::once(ALL_DEVICES_TYPE.to_string())
            .chain(
                self.types
                    .iter()
                    .filter(|t| t.as_str() != ALL_DEVICES_TYPE)
                    .cloned(),
            )
            .collect()
    }

    /// All devices in load order
    pub fn all_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Devices of one type; an empty type means every device
    pub fn by_type(&self, device_type: &str) -> Vec<&Device> {
        if device_type.is_empty() {
            return self.all_devices().collect();
        }
        self.devices
            .values()
            .filter(|d| d.device_type == device_type)
            .collect()
    }

    /// Look up a device, `None` when the ID is unknown
    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Case-insensitive substring search over names and IDs
    pub fn search(&self, keyword: &str) -> Vec<&Device> {
        let needle = keyword.to_lowercase();
        self.devices
            .values()
            .filter(|d| d.matches_lowercase(&needle))
            .collect()
    }

    /// Resolve a device's children, skipping IDs that do not resolve
    pub fn children_of(&self, parent_id: &str) -> Vec<&Device> {
        self.devices
            .get(parent_id)
            .map(|parent| {
                parent
                    .children
                    .iter()
                    .filter_map(|cid| self.devices.get(cid))
                    .collect()
            })
            .unwrap_or_default()
    }
}

type Snapshot = (IndexMap<DeviceId, Device>, Vec<String>);

fn build_snapshot(source: &dyn DeviceSource) -> Result<Snapshot, LoadError> {
    let snapshot = source.fetch()?;

    if snapshot.devices.is_empty() {
        return Err(LoadError::Empty);
    }

    let mut types: Vec<String> = Vec::new();
    for t in snapshot.types {
        if !t.is_empty() && !types.contains(&t) {
            types.push(t);
        }
    }
    if types.is_empty() {
        return Err(LoadError::NoTypes);
    }

    // Pass 1: insert records verbatim
    let mut devices: IndexMap<DeviceId, Device> = IndexMap::with_capacity(snapshot.devices.len());
    for (index, device) in snapshot.devices.into_iter().enumerate() {
        if !device.is_valid() {
            return Err(LoadError::InvalidDevice { index });
        }
        if devices.contains_key(&device.id) {
            return Err(LoadError::DuplicateDevice(device.id));
        }
        if !types.contains(&device.device_type) {
            warn!(device = %device.id, device_type = %device.device_type, "Device has undeclared type");
        }
        devices.insert(device.id.clone(), device);
    }

    link_hierarchy(&mut devices);
    validate_hierarchy(&devices)?;

    Ok((devices, types))
}

/// Pass 2: append every device to its parent's child list
fn link_hierarchy(devices: &mut IndexMap<DeviceId, Device>) {
    let links: Vec<(DeviceId, DeviceId)> = devices
        .values()
        .filter_map(|d| d.parent().map(|p| (p.clone(), d.id.clone())))
        .collect();

    for (parent_id, child_id) in links {
        if let Some(parent) = devices.get_mut(&parent_id) {
            parent.add_child(&child_id);
        }
    }
}

fn validate_hierarchy(devices: &IndexMap<DeviceId, Device>) -> Result<(), LoadError> {
    for device in devices.values() {
        if let Some(parent) = device.parent() {
            if !devices.contains_key(parent) {
                return Err(LoadError::MissingParent {
                    device: device.id.clone(),
                    parent: parent.clone(),
                });
            }
        }

        for child in &device.children {
            if !devices.contains_key(child) {
                return Err(LoadError::MissingChild {
                    device: device.id.clone(),
                    child: child.clone(),
                });
            }
        }
    }

    let mut finished = HashSet::new();
    for device in devices.values() {
        let mut path = Vec::new();
        if has_cycle(devices, &device.id, &mut path, &mut finished) {
            return Err(LoadError::Cycle(device.id.clone()));
        }
    }
    Ok(())
}

/// Depth-first walk along child edges. Only the current path counts as a
/// cycle, so a descendant reached through two parents is accepted; nodes
/// whose subtrees were already walked are skipped.
fn has_cycle<'a>(
    devices: &'a IndexMap<DeviceId, Device>,
    id: &'a DeviceId,
    path: &mut Vec<&'a DeviceId>,
    finished: &mut HashSet<&'a DeviceId>,
) -> bool {
    if path.contains(&id) {
        return true;
    }
    if finished.contains(id) {
        return false;
    }
    let Some(device) = devices.get(id) else {
        return false;
    };

    path.push(id);
    for child in &device.children {
        if has_cycle(devices, child, path, finished) {
            return true;
        }
    }
    path.pop();
    finished.insert(id);
    false
}
