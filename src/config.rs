//! Hub configuration
//!
//! Stored as TOML under the user's config directory. Every field has a
//! default, so a partial file (or no file) is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for the HID device source
///
/// Mirrors `analog_transport::HidSourceConfig` so the config file can be
/// read without the `hid` feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HidConfig {
    /// Travel in millimetres reported as magnitude 1.0
    pub max_travel_mm: f32,
    /// Devices exposing an interface on one of these usage pages are left
    /// to their vendor's own plugin
    pub ignored_usage_pages: Vec<u16>,
    /// Extra VID/PID pairs to sample beside the built-in models
    pub extra_devices: Vec<(u16, u16)>,
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            max_travel_mm: 4.0,
            ignored_usage_pages: vec![analog_transport::protocol::device::WOOTING_USAGE_PAGE],
            extra_devices: Vec::new(),
        }
    }
}

#[cfg(feature = "hid")]
impl From<&HidConfig> for analog_transport::HidSourceConfig {
    fn from(config: &HidConfig) -> Self {
        Self {
            max_travel_mm: config.max_travel_mm,
            ignored_usage_pages: config.ignored_usage_pages.clone(),
            extra_devices: config.extra_devices.clone(),
        }
    }
}

/// Top-level hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Time between discovery passes (ms)
    pub discovery_interval_ms: u64,
    /// Longest a sampling thread blocks in one device read (ms)
    pub read_timeout_ms: u64,
    /// Pause after a failed device read (ms)
    pub error_backoff_ms: u64,
    /// Emit one zero-magnitude entry when a key is let go
    pub report_released_keys: bool,
    pub hid: HidConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            discovery_interval_ms: 1000,
            read_timeout_ms: 20,
            error_backoff_ms: 100,
            report_released_keys: true,
            hid: HidConfig::default(),
        }
    }
}

impl HubConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("analog-hub")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let toml_str = toml::to_string_pretty(&HubConfig::default()).unwrap();
        assert!(toml_str.contains("discovery_interval_ms = 1000"));
        assert!(toml_str.contains("report_released_keys = true"));
        assert!(toml_str.contains("[hid]"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: HubConfig = toml::from_str(
            r#"
report_released_keys = false

[hid]
max_travel_mm = 3.5
"#,
        )
        .unwrap();
        assert!(!config.report_released_keys);
        assert_eq!(config.discovery_interval_ms, 1000);
        assert_eq!(config.hid.max_travel_mm, 3.5);
        assert_eq!(config.hid.ignored_usage_pages, vec![0xFF54]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = HubConfig {
            discovery_interval_ms: 250,
            hid: HidConfig {
                extra_devices: vec![(0x1234, 0x5678)],
                ..Default::default()
            },
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(HubConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = HubConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "discovery_interval_ms = \"soon\"").unwrap();
        assert!(matches!(
            HubConfig::load(&path),
            Err(crate::error::HubError::Config(_))
        ));
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let config = HubConfig {
            discovery_interval_ms: 0,
            read_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.discovery_interval(), Duration::from_millis(1));
        assert_eq!(config.read_timeout(), Duration::from_millis(1));
    }
}
