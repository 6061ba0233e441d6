//! Persistence backends
//!
//! The store only needs a narrow contract from its storage: small keyed
//! values (`get`/`put`) and one full snapshot image.

use crate::error::Result;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Snapshot bytes as handed out by a backend
pub enum SnapshotBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for SnapshotBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            SnapshotBytes::Mapped(map) => &map[..],
            SnapshotBytes::Owned(bytes) => &bytes[..],
        }
    }
}

/// Abstract persistence backend
pub trait PersistenceBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Read the last complete snapshot, if one was ever written
    fn read_snapshot(&self) -> Result<Option<SnapshotBytes>>;

    /// Replace the snapshot. Must never leave a half-written image in place of
    /// the previous one.
    fn write_snapshot(&self, image: &[u8]) -> Result<()>;
}

const SNAPSHOT_FILE: &str = "fingerprints.fsdb";
const KEY_EXTENSION: &str = "json";

/// Directory-based backend: one file per key plus the snapshot file
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.base_dir.join(SNAPSHOT_FILE)
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{safe}.{KEY_EXTENSION}"))
    }

    /// Write to a sibling temp file, fsync, rename over the target, then
    /// fsync the directory so the rename itself survives a crash
    fn write_atomically(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let tmp = target.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, target)?;
        self.sync_dir()
    }

    #[cfg(unix)]
    fn sync_dir(&self) -> Result<()> {
        File::open(&self.base_dir)?.sync_all()?;
        Ok(())
    }

    // Directories cannot be opened as files here; the rename is all we get
    #[cfg(not(unix))]
    fn sync_dir(&self) -> Result<()> {
        Ok(())
    }
}

impl PersistenceBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.key_path(key);
        self.write_atomically(&path, value)
    }

    fn read_snapshot(&self) -> Result<Option<SnapshotBytes>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        if file.metadata()?.len() == 0 {
            // Mapping an empty file fails on some platforms
            return Ok(Some(SnapshotBytes::Owned(Vec::new())));
        }
        // SAFETY: the snapshot is only ever replaced via rename, never
        // modified in place, so the mapped file does not change under us.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Some(SnapshotBytes::Mapped(map)))
    }

    fn write_snapshot(&self, image: &[u8]) -> Result<()> {
        let path = self.snapshot_path();
        log::info!("Writing snapshot ({} bytes) to {}", image.len(), path.display());
        self.write_atomically(&path, image)
    }
}

/// In-memory backend
#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, Vec<u8>>>,
    snapshot: Mutex<Option<Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn read_snapshot(&self) -> Result<Option<SnapshotBytes>> {
        let snapshot = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
        Ok(snapshot.clone().map(SnapshotBytes::Owned))
    }

    fn write_snapshot(&self, image: &[u8]) -> Result<()> {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|p| p.into_inner());
        *snapshot = Some(image.to_vec());
        Ok(())
    }
}
