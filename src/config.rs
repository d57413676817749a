//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// One configured block-list source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSource {
    /// Download URL. `http`, `https` and `file` schemes are supported.
    pub url: String,
    /// Disabled sources are kept in the config but never fetched.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Filter engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Block-list sources, fetched in order.
    #[serde(default)]
    pub sources: Vec<FilterSource>,

    /// Directory holding the canonical list, index, and override files.
    pub data_dir: PathBuf,

    /// Automatic reload interval in days.
    #[serde(default = "default_reload_interval_days")]
    pub reload_interval_days: u64,

    /// Capacity of the allowed-verdict cache.
    #[serde(default = "default_cache_size")]
    pub allowed_cache_size: usize,

    /// Capacity of the blocked-verdict cache.
    #[serde(default = "default_cache_size")]
    pub blocked_cache_size: usize,

    /// Rewrite the canonical list without duplicates after a rebuild that
    /// found any.
    #[serde(default = "default_remove_duplicates")]
    pub remove_duplicates: bool,

    /// Load the whole index into memory instead of memory-mapping it.
    #[serde(default)]
    pub eager_index_load: bool,
}

fn default_reload_interval_days() -> u64 {
    4
}

fn default_cache_size() -> usize {
    1000
}

fn default_remove_duplicates() -> bool {
    true
}

impl EngineConfig {
    /// A configuration with every tunable at its default.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            sources: Vec::new(),
            data_dir: data_dir.into(),
            reload_interval_days: default_reload_interval_days(),
            allowed_cache_size: default_cache_size(),
            blocked_cache_size: default_cache_size(),
            remove_duplicates: default_remove_duplicates(),
            eager_index_load: false,
        }
    }

    /// Load and validate a YAML configuration file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reload_interval_days == 0 {
            return Err(Error::Config(
                "reload_interval_days must be at least 1".to_string(),
            ));
        }
        if self.allowed_cache_size == 0 || self.blocked_cache_size == 0 {
            return Err(Error::Config(
                "cache sizes must be at least 1".to_string(),
            ));
        }
        for source in &self.sources {
            if source.url.trim().is_empty() {
                return Err(Error::Config("source with empty URL".to_string()));
            }
        }
        Ok(())
    }

    /// URLs of the enabled sources, in configuration order.
    pub fn enabled_urls(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.url.clone())
            .collect()
    }

    pub fn paths(&self) -> EnginePaths {
        EnginePaths::new(&self.data_dir)
    }
}

/// Well-known file locations inside the engine data directory.
#[derive(Debug, Clone)]
pub struct EnginePaths {
    /// Merged download of all enabled sources.
    pub canonical: PathBuf,
    /// Entry-count sidecar for the canonical list.
    pub sidecar: PathBuf,
    /// Persisted binary index.
    pub index: PathBuf,
    /// Crash-consistency marker; present while the index is being replaced.
    pub outdated_marker: PathBuf,
    /// User overrides file.
    pub overrides: PathBuf,
    /// Optional locally maintained extra hosts, indexed alongside downloads.
    pub extra_hosts: PathBuf,
}

impl EnginePaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            canonical: data_dir.join("hosts.canonical"),
            sidecar: data_dir.join("hosts.canonical.count"),
            index: data_dir.join("hosts.idx"),
            outdated_marker: data_dir.join("hosts.idx.outdated"),
            overrides: data_dir.join("overrides.txt"),
            extra_hosts: data_dir.join("extra-hosts.txt"),
        }
    }
}
