//! Store error taxonomy

use crate::model::TrackId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A track with the same source identity is already stored (or being stored)
    #[error("track already indexed: {source_id} (track {existing:?})")]
    DuplicateTrack {
        source_id: String,
        existing: Option<TrackId>,
    },

    /// Snapshot was built with a different fingerprint configuration
    #[error("configuration mismatch: store built with {found:#018x}, expected {expected:#018x}")]
    ConfigMismatch { expected: u64, found: u64 },

    /// Snapshot is truncated, corrupted or internally inconsistent
    #[error("snapshot integrity check failed: {0}")]
    Integrity(String),

    /// Sub-fingerprint sequence handed to `insert` is malformed
    #[error("invalid fingerprint record: {0}")]
    InvalidRecord(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn integrity(msg: impl Into<String>) -> Self {
        StoreError::Integrity(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
