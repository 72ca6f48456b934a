//! Configuration loading

use anyhow::Result;
use devsel_core::{DeviceSource, FileSource, SampleSource, TypeView, DEFAULT_EVENT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Where device data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Built-in sample catalog
    #[default]
    Sample,
    /// TOML or JSON device file
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Device file, required when `kind = "file"`
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Initial type tab; empty selects the all-devices tab
    #[serde(default)]
    pub device_type: String,
    /// Initial search keyword
    #[serde(default)]
    pub search: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Device IDs selected at startup
    #[serde(default)]
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Capacity of the change notification channel
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Config {
    /// Build the configured device source
    pub fn device_source(&self) -> Result<Box<dyn DeviceSource>> {
        match self.source.kind {
            SourceKind::Sample => Ok(Box::new(SampleSource)),
            SourceKind::File => {
                let path = self
                    .source
                    .path
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("source.path is required for file sources"))?;
                Ok(Box::new(FileSource::new(PathBuf::from(path))))
            }
        }
    }

    pub fn initial_view(&self) -> TypeView {
        TypeView::from_label(&self.view.device_type)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        source: SourceConfig {
            kind: SourceKind::File,
            path: Some("devices.toml".to_string()),
        },
        view: ViewConfig::default(),
        selection: SelectionConfig {
            devices: vec!["root_001".to_string()],
        },
        events: EventsConfig::default(),
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/devsel.toml")).unwrap();
        assert_eq!(config.source.kind, SourceKind::Sample);
        assert_eq!(config.events.capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.initial_view(), TypeView::All);
    }

    #[test]
    fn test_partial_config() {
        let config: Config = toml::from_str(
            r#"
[view]
device_type = "传感器"

[selection]
devices = ["sensor_001"]
"#,
        )
        .unwrap();
        assert_eq!(config.initial_view(), TypeView::Type("传感器".to_string()));
        assert_eq!(config.selection.devices, vec!["sensor_001"]);
        assert_eq!(config.source.kind, SourceKind::Sample);
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("devsel.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.source.kind, SourceKind::File);
        assert_eq!(config.source.path.as_deref(), Some("devices.toml"));
    }

    #[test]
    fn test_file_source_requires_path() {
        let config: Config = toml::from_str("[source]\nkind = \"file\"\n").unwrap();
        assert!(config.device_source().is_err());
    }
}
