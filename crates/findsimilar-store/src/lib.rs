//! FindSimilar store - fingerprint database
//!
//! Track table, per-track fingerprint records, a sharded inverted index and
//! the snapshot file format used to persist them.

pub mod backend;
pub mod error;
pub mod format;
pub mod index;
pub mod manifest;
pub mod model;
pub mod reader;
pub mod store;
pub mod writer;

pub use backend::{FileBackend, MemoryBackend, PersistenceBackend, SnapshotBytes};
pub use error::StoreError;
pub use format::{SnapshotHeader, SnapshotPayload, MAGIC, VERSION};
pub use index::InvertedIndex;
pub use manifest::StoreManifest;
pub use model::{HashCode, Posting, StoreStats, SubFingerprint, Track, TrackId, TrackMeta};
pub use reader::SnapshotReader;
pub use store::{FingerprintStore, ReadView, StoreConfig};
pub use writer::SnapshotWriter;
