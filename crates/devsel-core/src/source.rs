//! Device data sources
//!
//! A source produces a [`DeviceSnapshot`] once per session. The built-in
//! [`SampleSource`] carries the demo catalog; [`FileSource`] reads a TOML or
//! JSON document of the same shape:
//!
//! ```toml
//! types = ["全部模型", "传感器"]
//!
//! [[device]]
//! id = "sensor_group"
//! name = "传感器"
//! type = "传感器"
//! group = true
//!
//! [[device]]
//! id = "sensor_001"
//! name = "温度传感器A"
//! type = "传感器"
//! parent = "sensor_group"
//! ```

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::device::{Device, DeviceSnapshot};

/// Label of the tab that shows every device regardless of type
pub const ALL_DEVICES_TYPE: &str = "全部模型";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read device file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse device TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to parse device JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported device file format: {0}")]
    UnsupportedFormat(String),
}

/// Anything that can supply the initial device catalog
pub trait DeviceSource {
    fn fetch(&self) -> Result<DeviceSnapshot, SourceError>;
}

impl DeviceSnapshot {
    /// Parse a snapshot from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, SourceError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse a snapshot from a JSON string
    pub fn from_json(content: &str) -> Result<Self, SourceError> {
        Ok(serde_json::from_str(content)?)
    }
}

/// The demo catalog: three typed groups with their member devices
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleSource;

impl DeviceSource for SampleSource {
    fn fetch(&self) -> Result<DeviceSnapshot, SourceError> {
        let types = [ALL_DEVICES_TYPE, "根模型", "子模型", "传感器"]
            .iter()
            .map(|t| t.to_string())
            .collect();

        let devices = vec![
            Device::group("root_group", "根模型", "根模型"),
            Device::new("root_001", "主控制器", "根模型").with_parent("root_group"),
            Device::new("root_002", "备用控制器", "根模型").with_parent("root_group"),
            Device::group("child_group", "子模型", "子模型"),
            Device::new("child_001", "温度模块", "子模型").with_parent("child_group"),
            Device::new("child_002", "湿度模块", "子模型").with_parent("child_group"),
            Device::new("child_003", "压力模块", "子模型").with_parent("child_group"),
            Device::group("sensor_group", "传感器", "传感器"),
            Device::new("sensor_001", "温度传感器A", "传感器").with_parent("sensor_group"),
            Device::new("sensor_002", "温度传感器B", "传感器").with_parent("sensor_group"),
            Device::new("sensor_003", "湿度传感器A", "传感器").with_parent("sensor_group"),
            Device::new("sensor_004", "压力传感器A", "传感器").with_parent("sensor_group"),
        ];

        Ok(DeviceSnapshot::new(types, devices))
    }
}

/// Device catalog stored in a `.toml` or `.json` file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceSource for FileSource {
    fn fetch(&self) -> Result<DeviceSnapshot, SourceError> {
        let extension = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let content = std::fs::read_to_string(&self.path)?;
        let snapshot = match extension.as_str() {
            "toml" => DeviceSnapshot::from_toml(&content)?,
            "json" => DeviceSnapshot::from_json(&content)?,
            other => return Err(SourceError::UnsupportedFormat(other.to_string())),
        };

        debug!(
            path = %self.path.display(),
            devices = snapshot.devices.len(),
            types = snapshot.types.len(),
            "Read device file"
        );
        Ok(snapshot)
    }
}

/// A snapshot held in memory, handed out as-is
impl DeviceSource for DeviceSnapshot {
    fn fetch(&self) -> Result<DeviceSnapshot, SourceError> {
        Ok(self.clone())
    }
}
