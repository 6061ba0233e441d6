//! JSON manifest written next to each snapshot
//!
//! Lets tooling report what a database holds without decoding the snapshot.

use crate::backend::PersistenceBackend;
use crate::error::Result;
use crate::model::StoreStats;
use serde::{Deserialize, Serialize};

pub const MANIFEST_KEY: &str = "manifest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub version: String,
    pub config_fingerprint: String,
    pub config_descriptor: String,
    pub stats: StoreStats,
    pub written_at: String,
}

impl StoreManifest {
    pub fn new(config_fingerprint: u64, config_descriptor: String, stats: StoreStats) -> Self {
        Self {
            version: "1.0".to_string(),
            config_fingerprint: format!("{config_fingerprint:016x}"),
            config_descriptor,
            stats,
            written_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn save(&self, backend: &dyn PersistenceBackend) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        backend.put(MANIFEST_KEY, &json)
    }

    pub fn load(backend: &dyn PersistenceBackend) -> Result<Option<Self>> {
        match backend.get(MANIFEST_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
