//! Configuration for the fixture engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (fixtures.toml)
//! - Environment variables (FIXTURES__*)
//!
//! ## Example config file (fixtures.toml):
//! ```toml
//! [document]
//! path = "mock/data.json"
//!
//! [synthesis]
//! service_count = 6
//! task_services = 6
//!
//! [persist]
//! enabled = false
//! backup_suffix = "bak"
//! temp_suffix = "tmp"
//!
//! [repair]
//! backfill_service_stubs = true
//! rewrite_unknown_fields = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::synth::services::MAX_SERVICE_COUNT;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureConfig {
    #[serde(default)]
    pub document: DocumentConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub persist: PersistConfig,

    #[serde(default)]
    pub repair: RepairConfig,
}

/// Where the fixture document lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_document_path")]
    pub path: PathBuf,
}

/// Synthesis targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Number of `gensvc{i}` services to ensure
    #[serde(default = "default_service_count")]
    pub service_count: usize,

    /// How many synthetic services receive primary-pass tasks
    #[serde(default = "default_task_services")]
    pub task_services: usize,
}

/// Write-back settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Opt-in switch for writing the document back
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,

    #[serde(default = "default_temp_suffix")]
    pub temp_suffix: String,
}

/// Repair pass settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Create stub service records for IDs known only from listings
    #[serde(default = "default_true")]
    pub backfill_service_stubs: bool,

    /// Rewrite colliding node IDs inside fields the model does not type
    #[serde(default = "default_true")]
    pub rewrite_unknown_fields: bool,
}

// Default value functions
fn default_document_path() -> PathBuf {
    PathBuf::from("mock/data.json")
}

fn default_service_count() -> usize {
    6
}

fn default_task_services() -> usize {
    6
}

fn default_backup_suffix() -> String {
    "bak".to_string()
}

fn default_temp_suffix() -> String {
    "tmp".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            path: default_document_path(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            service_count: default_service_count(),
            task_services: default_task_services(),
        }
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backup_suffix: default_backup_suffix(),
            temp_suffix: default_temp_suffix(),
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            backfill_service_stubs: true,
            rewrite_unknown_fields: true,
        }
    }
}

impl FixtureConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["fixtures.toml", ".fixtures.toml", "config/fixtures.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "swarm", "fixtures") {
            let xdg_config = config_dir.config_dir().join("fixtures.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // FIXTURES__PERSIST__ENABLED=true etc.
        builder = builder.add_source(
            Environment::with_prefix("FIXTURES")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Document path (resolves relative paths against the working directory)
    pub fn document_path(&self) -> PathBuf {
        if self.document.path.is_absolute() {
            self.document.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.document.path)
        }
    }

    /// Sanity checks beyond what deserialization enforces
    pub fn validate(&self) -> Result<(), String> {
        if self.synthesis.service_count > MAX_SERVICE_COUNT {
            return Err(format!(
                "synthesis.service_count ({}) exceeds {}; ports past 65535 cannot be assigned",
                self.synthesis.service_count, MAX_SERVICE_COUNT
            ));
        }
        if self.synthesis.task_services > self.synthesis.service_count {
            return Err(format!(
                "synthesis.task_services ({}) exceeds synthesis.service_count ({})",
                self.synthesis.task_services, self.synthesis.service_count
            ));
        }
        if self.persist.backup_suffix.is_empty() || self.persist.temp_suffix.is_empty() {
            return Err("persist suffixes must not be empty".to_string());
        }
        if self.persist.backup_suffix == self.persist.temp_suffix {
            return Err("persist.backup_suffix and persist.temp_suffix must differ".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FixtureConfig::default();
        assert!(!config.persist.enabled);
        assert_eq!(config.synthesis.service_count, 6);
        assert!(config.repair.backfill_service_stubs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_config() {
        let config = FixtureConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[document]"));
        assert!(toml_str.contains("[persist]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[synthesis]\nservice_count = 3\ntask_services = 2\n").unwrap();

        let config = FixtureConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.synthesis.service_count, 3);
        assert_eq!(config.synthesis.task_services, 2);
        assert_eq!(config.persist.backup_suffix, "bak");
    }

    #[test]
    fn test_validate_caps_service_count() {
        let mut config = FixtureConfig::default();
        config.synthesis.service_count = MAX_SERVICE_COUNT;
        assert!(config.validate().is_ok());
        config.synthesis.service_count = MAX_SERVICE_COUNT + 1;
        assert!(config.validate().unwrap_err().contains("service_count"));
    }

    #[test]
    fn test_validate_rejects_matching_suffixes() {
        let mut config = FixtureConfig::default();
        config.persist.temp_suffix = "bak".into();
        assert!(config.validate().is_err());
    }
}
