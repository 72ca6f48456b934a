//! devsel core - device hierarchy registry and tri-state selection engine
//!
//! This crate provides the pieces behind a device selection panel:
//! - Device records and data sources (built-in sample catalog, TOML/JSON files)
//! - A validated device registry with parent/child linking and cycle detection
//! - A hierarchy index with children-by-parent and roots-by-type lookups
//! - A tri-state selection tree kept consistent across toggles
//! - Keyword filtering with visible/selected counts
//! - A selection controller that ties them together and broadcasts changes

pub mod controller;
pub mod device;
pub mod filter;
pub mod hierarchy;
pub mod registry;
pub mod source;
pub mod tree;

pub use controller::{EventReceiver, SelectionController, SelectionEvent, DEFAULT_EVENT_CAPACITY};
pub use device::{Device, DeviceId, DeviceSnapshot};
pub use filter::{VisibilityFilter, VisibleCounts};
pub use hierarchy::{HierarchyIndex, TypeView};
pub use registry::{DeviceRegistry, LoadError, LoadStatus};
pub use source::{DeviceSource, FileSource, SampleSource, SourceError, ALL_DEVICES_TYPE};
pub use tree::{CheckState, NodeId, SelectionTree, TreeNode};
