//! TOML settings for FindSimilar
//!
//! Every section is optional; missing values take their defaults.
//!
//! ```toml
//! [storage]
//! database_dir = "./findsimilar-db"
//! compress = true
//!
//! [matching]
//! threshold_votes = 4
//! max_results = 25
//!
//! [scan]
//! skip_duration_above_secs = 600.0
//! threads = 4
//! ```

use crate::config::{FingerprintConfig, MatchConfig};
use crate::scan::ScanOptions;
use anyhow::Context;
use findsimilar_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main settings structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub fingerprint: FingerprintConfig,
    pub matching: MatchConfig,
    pub scan: ScanOptions,
}

/// Where and how the fingerprint database is persisted
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_dir: PathBuf,
    /// zstd-compress the snapshot payload
    pub compress: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_dir: PathBuf::from("./findsimilar-db"),
            compress: true,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML settings {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.fingerprint.validate()?;
        if self.matching.threshold_votes == 0 {
            anyhow::bail!("matching.threshold_votes must be > 0");
        }
        if self.scan.skip_duration_above_secs < 0.0 {
            anyhow::bail!("scan.skip_duration_above_secs must be >= 0");
        }
        Ok(())
    }

    /// Store parameters derived from the fingerprint configuration
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(
            self.fingerprint.fingerprint(),
            self.fingerprint.descriptor(),
            self.fingerprint.codes_per_block,
        )
        .compressed(self.storage.compress)
    }
}
