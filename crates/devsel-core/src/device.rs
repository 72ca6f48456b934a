//! Device records and the snapshot a data source hands to the registry

use serde::{Deserialize, Serialize};

/// Unique identifier for a device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::borrow::Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A device or device group in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique device identifier
    pub id: DeviceId,
    /// Display name
    pub name: String,
    /// Category key (one of the registry's device types)
    #[serde(rename = "type")]
    pub device_type: String,
    /// Parent device, `None` for roots
    #[serde(default, rename = "parent", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<DeviceId>,
    /// Container node with no selectable identity of its own
    #[serde(default, rename = "group")]
    pub is_group: bool,
    /// Child IDs in load order, no duplicates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DeviceId>,
}

impl Device {
    /// Create a selectable device
    pub fn new(id: &str, name: &str, device_type: &str) -> Self {
        Self {
            id: DeviceId::from(id),
            name: name.to_string(),
            device_type: device_type.to_string(),
            parent_id: None,
            is_group: false,
            children: Vec::new(),
        }
    }

    /// Create a group (container) node
    pub fn group(id: &str, name: &str, device_type: &str) -> Self {
        Self {
            is_group: true,
            ..Self::new(id, name, device_type)
        }
    }

    /// Set the parent device
    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent_id = if parent.is_empty() {
            None
        } else {
            Some(DeviceId::from(parent))
        };
        self
    }

    /// A device is valid when both its ID and name are non-empty
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }

    /// Parent ID if set and non-empty
    pub fn parent(&self) -> Option<&DeviceId> {
        self.parent_id.as_ref().filter(|p| !p.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Append a child ID, ignoring empty and duplicate IDs
    ///
    /// Returns `true` if the child was added.
    pub fn add_child(&mut self, child: &DeviceId) -> bool {
        if child.is_empty() || self.children.contains(child) {
            return false;
        }
        self.children.push(child.clone());
        true
    }

    /// Remove every occurrence of a child ID
    pub fn remove_child(&mut self, child: &DeviceId) {
        self.children.retain(|c| c != child);
    }

    /// Case-insensitive substring match on name or ID
    ///
    /// `needle` must already be lowercase.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.name.to_lowercase().contains(needle)
            || self.id.as_str().to_lowercase().contains(needle)
    }
}

/// A raw device catalog as delivered by a data source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Declared device types, in display order
    #[serde(default)]
    pub types: Vec<String>,
    /// Device records, in load order
    #[serde(default, rename = "device")]
    pub devices: Vec<Device>,
}

impl DeviceSnapshot {
    pub fn new(types: Vec<String>, devices: Vec<Device>) -> Self {
        Self { types, devices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_validity() {
        assert!(Device::new("d1", "Device", "t").is_valid());
        assert!(!Device::new("", "Device", "t").is_valid());
        assert!(!Device::new("d1", "", "t").is_valid());
    }

    #[test]
    fn test_add_child_suppresses_duplicates() {
        let mut group = Device::group("g", "Group", "t");
        assert!(group.add_child(&DeviceId::from("a")));
        assert!(!group.add_child(&DeviceId::from("a")));
        assert!(!group.add_child(&DeviceId::from("")));
        assert!(group.add_child(&DeviceId::from("b")));
        assert_eq!(group.children, vec![DeviceId::from("a"), DeviceId::from("b")]);

        group.remove_child(&DeviceId::from("a"));
        assert_eq!(group.children, vec![DeviceId::from("b")]);
    }

    #[test]
    fn test_empty_parent_is_root() {
        let device = Device::new("d1", "Device", "t").with_parent("");
        assert!(device.is_root());

        let device = Device::new("d1", "Device", "t").with_parent("g");
        assert_eq!(device.parent(), Some(&DeviceId::from("g")));
    }

    #[test]
    fn test_matches_name_or_id() {
        let device = Device::new("Sensor_001", "温度传感器A", "传感器");
        assert!(device.matches_lowercase("温度"));
        assert!(device.matches_lowercase("sensor_0"));
        assert!(device.matches_lowercase(""));
        assert!(!device.matches_lowercase("湿度"));
    }
}
