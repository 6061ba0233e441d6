//! Fingerprint store: track table, per-track fingerprint records and the
//! inverted index, with snapshot persistence.
//!
//! Locking: the inverted index locks per shard (see [`InvertedIndex`]); the
//! track table has its own `RwLock`. An insert reserves the source identity,
//! writes all postings, and only then commits the track under a fresh epoch.
//! Readers capture the epoch first and ignore tracks committed after it, so a
//! query never counts a track whose postings are still being written.

use crate::backend::PersistenceBackend;
use crate::error::{Result, StoreError};
use crate::format::{SnapshotHeader, SnapshotPayload};
use crate::index::InvertedIndex;
use crate::manifest::StoreManifest;
use crate::model::{HashCode, Posting, StoreStats, SubFingerprint, Track, TrackId, TrackMeta};
use crate::reader::SnapshotReader;
use crate::writer::SnapshotWriter;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Parameters fixed for the lifetime of a store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Fingerprint of the hashing configuration; persisted and checked on load
    pub config_fingerprint: u64,
    /// Readable form of the same configuration
    pub config_descriptor: String,
    /// Number of codes every sub-fingerprint carries
    pub codes_per_block: usize,
    /// zstd-compress snapshot payloads
    pub compress: bool,
}

impl StoreConfig {
    pub fn new(config_fingerprint: u64, config_descriptor: impl Into<String>, codes_per_block: usize) -> Self {
        Self {
            config_fingerprint,
            config_descriptor: config_descriptor.into(),
            codes_per_block,
            compress: true,
        }
    }

    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }
}

struct TrackEntry {
    track: Track,
    fingerprints: Arc<[SubFingerprint]>,
    epoch: u64,
}

#[derive(Default)]
struct TrackTable {
    entries: HashMap<TrackId, TrackEntry>,
    by_source: HashMap<String, TrackId>,
    /// Sources reserved by inserts that have not committed yet
    pending: HashSet<String>,
}

pub struct FingerprintStore {
    config: StoreConfig,
    tracks: RwLock<TrackTable>,
    index: InvertedIndex,
    next_id: AtomicU32,
    epoch: AtomicU64,
}

impl FingerprintStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            tracks: RwLock::new(TrackTable::default()),
            index: InvertedIndex::new(),
            next_id: AtomicU32::new(1),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn read_tracks(&self) -> RwLockReadGuard<'_, TrackTable> {
        self.tracks.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_tracks(&self) -> RwLockWriteGuard<'_, TrackTable> {
        self.tracks.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Create a track and index all of its sub-fingerprints.
    ///
    /// Fails with [`StoreError::DuplicateTrack`] if the source is already
    /// stored or being stored, unless `overwrite` is set, in which case the
    /// previous track is replaced.
    pub fn insert(
        &self,
        meta: TrackMeta,
        sub_fingerprints: Vec<SubFingerprint>,
        overwrite: bool,
    ) -> Result<TrackId> {
        self.validate_record(&sub_fingerprints)?;

        let (id, replaced) = {
            let mut table = self.write_tracks();
            if table.pending.contains(&meta.source) {
                return Err(StoreError::DuplicateTrack {
                    source_id: meta.source,
                    existing: None,
                });
            }
            let replaced = match table.by_source.get(&meta.source).copied() {
                Some(existing) if !overwrite => {
                    return Err(StoreError::DuplicateTrack {
                        source_id: meta.source,
                        existing: Some(existing),
                    });
                }
                Some(existing) => {
                    table.by_source.remove(&meta.source);
                    table.entries.remove(&existing)
                }
                None => None,
            };
            table.pending.insert(meta.source.clone());
            (TrackId(self.next_id.fetch_add(1, Ordering::SeqCst)), replaced)
        };

        if let Some(old) = replaced {
            log::info!("Replacing track {} ({})", old.track.id, old.track.source);
            self.remove_postings(old.track.id, &old.fingerprints);
        }

        for fp in &sub_fingerprints {
            let posting = Posting::new(id, fp.position);
            for code in fp.hash_codes() {
                self.index.insert(code, posting);
            }
        }

        let track = Track {
            id,
            source: meta.source,
            title: meta.title,
            duration_secs: meta.duration_secs,
            fingerprint_count: sub_fingerprints.len() as u32,
            indexed_at: Utc::now(),
        };

        let mut table = self.write_tracks();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        table.pending.remove(&track.source);
        table.by_source.insert(track.source.clone(), id);
        table.entries.insert(
            id,
            TrackEntry {
                track,
                fingerprints: sub_fingerprints.into(),
                epoch,
            },
        );

        Ok(id)
    }

    fn validate_record(&self, sub_fingerprints: &[SubFingerprint]) -> Result<()> {
        let mut expected = 0u32;
        for fp in sub_fingerprints {
            if fp.position != expected {
                return Err(StoreError::InvalidRecord(format!(
                    "positions must run 0, 1, 2, ...: expected {expected}, got {}",
                    fp.position
                )));
            }
            if fp.codes.len() != self.config.codes_per_block {
                return Err(StoreError::InvalidRecord(format!(
                    "sub-fingerprint {} has {} codes, store expects {}",
                    fp.position,
                    fp.codes.len(),
                    self.config.codes_per_block
                )));
            }
            if fp.silent && fp.codes.iter().any(|&c| c != 0) {
                return Err(StoreError::InvalidRecord(format!(
                    "silent sub-fingerprint {} carries non-zero codes",
                    fp.position
                )));
            }
            expected += 1;
        }
        Ok(())
    }

    fn remove_postings(&self, track: TrackId, fingerprints: &[SubFingerprint]) {
        let codes: HashSet<HashCode> = fingerprints.iter().flat_map(|fp| fp.hash_codes()).collect();
        for code in codes {
            self.index.remove(code, track);
        }
    }

    pub fn contains_source(&self, source: &str) -> bool {
        let table = self.read_tracks();
        table.by_source.contains_key(source) || table.pending.contains(source)
    }

    pub fn lookup(&self, code: HashCode) -> Vec<Posting> {
        self.index.lookup(code)
    }

    /// Batched lookup, aligned with `codes`
    pub fn lookup_many(&self, codes: &[HashCode]) -> Vec<Vec<Posting>> {
        self.index.lookup_many(codes)
    }

    /// Consistent read view: only tracks committed before this call are visible
    pub fn read_view(&self) -> ReadView<'_> {
        ReadView {
            store: self,
            epoch: self.epoch.load(Ordering::SeqCst),
        }
    }

    pub fn track(&self, id: TrackId) -> Option<Track> {
        self.read_tracks().entries.get(&id).map(|e| e.track.clone())
    }

    /// All committed tracks ordered by id
    pub fn tracks(&self) -> Vec<Track> {
        let mut tracks: Vec<Track> = self
            .read_tracks()
            .entries
            .values()
            .map(|e| e.track.clone())
            .collect();
        tracks.sort_by_key(|t| t.id);
        tracks
    }

    /// Case-insensitive substring search over title and source
    pub fn search_tracks(&self, query: &str) -> Vec<Track> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.tracks()
            .into_iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle) || t.source.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// The stored fingerprint record of a track
    pub fn fingerprints_of(&self, id: TrackId) -> Option<Arc<[SubFingerprint]>> {
        self.read_tracks()
            .entries
            .get(&id)
            .map(|e| Arc::clone(&e.fingerprints))
    }

    pub fn track_count(&self) -> usize {
        self.read_tracks().entries.len()
    }

    pub fn stats(&self) -> StoreStats {
        let sub_fingerprints = self
            .read_tracks()
            .entries
            .values()
            .map(|e| e.fingerprints.len() as u64)
            .sum();
        StoreStats {
            tracks: self.track_count(),
            sub_fingerprints,
            buckets: self.index.bucket_count(),
            postings: self.index.posting_count(),
        }
    }

    /// Persist all committed tracks and their index entries
    pub fn snapshot(&self, backend: &dyn PersistenceBackend) -> Result<StoreStats> {
        let (tracks, buckets, silent) = {
            let table = self.read_tracks();
            let mut entries: Vec<&TrackEntry> = table.entries.values().collect();
            entries.sort_by_key(|e| e.track.id);

            // Built from the per-track records so tracks still being inserted
            // never leak partial postings into the image.
            let mut buckets: BTreeMap<HashCode, Vec<Posting>> = BTreeMap::new();
            let mut silent = Vec::new();
            for entry in &entries {
                let mut quiet = Vec::new();
                for fp in entry.fingerprints.iter() {
                    if fp.silent {
                        quiet.push(fp.position);
                        continue;
                    }
                    let posting = Posting::new(entry.track.id, fp.position);
                    for code in fp.hash_codes() {
                        buckets.entry(code).or_default().push(posting);
                    }
                }
                if !quiet.is_empty() {
                    silent.push((entry.track.id, quiet));
                }
            }

            let tracks: Vec<Track> = entries.iter().map(|e| e.track.clone()).collect();
            (tracks, buckets.into_iter().collect::<Vec<_>>(), silent)
        };

        let posting_count: u64 = buckets.iter().map(|(_, b)| b.len() as u64).sum();
        let stats = StoreStats {
            tracks: tracks.len(),
            sub_fingerprints: tracks.iter().map(|t| t.fingerprint_count as u64).sum(),
            buckets: buckets.len(),
            postings: posting_count,
        };

        let header = SnapshotHeader::new(
            self.config.config_fingerprint,
            tracks.len() as u64,
            buckets.len() as u64,
            posting_count,
        );
        let payload = SnapshotPayload {
            config_descriptor: self.config.config_descriptor.clone(),
            next_track_id: self.next_id.load(Ordering::SeqCst),
            tracks,
            buckets,
            silent,
        };

        let image = SnapshotWriter::new()
            .compressed(self.config.compress)
            .encode(header, &payload)?;
        backend.write_snapshot(&image)?;

        StoreManifest::new(
            self.config.config_fingerprint,
            self.config.config_descriptor.clone(),
            stats,
        )
        .save(backend)?;

        log::info!(
            "Snapshot written: {} tracks, {} buckets, {} postings",
            stats.tracks,
            stats.buckets,
            stats.postings
        );
        Ok(stats)
    }

    /// Load the backend's snapshot, or `None` if it has never been written
    pub fn load(backend: &dyn PersistenceBackend, config: StoreConfig) -> Result<Option<Self>> {
        let image = match backend.read_snapshot()? {
            Some(image) => image,
            None => return Ok(None),
        };
        let (_, payload) = SnapshotReader::decode(&image, config.config_fingerprint)?;
        Self::from_payload(payload, config).map(Some)
    }

    /// Load the backend's snapshot, starting empty if there is none
    pub fn open(backend: &dyn PersistenceBackend, config: StoreConfig) -> Result<Self> {
        match Self::load(backend, config.clone())? {
            Some(store) => Ok(store),
            None => {
                log::info!("No snapshot found, starting with an empty store");
                Ok(Self::new(config))
            }
        }
    }

    fn from_payload(payload: SnapshotPayload, config: StoreConfig) -> Result<Self> {
        if payload.config_descriptor != config.config_descriptor {
            log::debug!(
                "Snapshot descriptor differs textually: {}",
                payload.config_descriptor
            );
        }

        let tables = config.codes_per_block;
        let mut table = TrackTable::default();
        let mut slots: HashMap<TrackId, Vec<Option<u32>>> = HashMap::new();
        let mut max_id = 0u32;

        for track in payload.tracks {
            if table.by_source.insert(track.source.clone(), track.id).is_some() {
                return Err(StoreError::integrity(format!(
                    "source stored twice: {}",
                    track.source
                )));
            }
            if slots
                .insert(track.id, vec![None; track.fingerprint_count as usize * tables])
                .is_some()
            {
                return Err(StoreError::integrity(format!("track id {} stored twice", track.id)));
            }
            max_id = max_id.max(track.id.0);
            table.entries.insert(
                track.id,
                TrackEntry {
                    track,
                    fingerprints: Arc::from(Vec::new()),
                    epoch: 0,
                },
            );
        }

        let mut quiet: HashMap<TrackId, HashSet<u32>> = HashMap::new();
        for (id, positions) in payload.silent {
            let track = table.entries.get(&id).ok_or_else(|| {
                StoreError::integrity(format!("silent positions for unknown track {id}"))
            })?;
            let count = track.track.fingerprint_count;
            if let Some(&position) = positions.iter().find(|&&p| p >= count) {
                return Err(StoreError::integrity(format!(
                    "silent position {position} beyond track {id} length"
                )));
            }
            quiet.entry(id).or_default().extend(positions);
        }

        for (code, postings) in &payload.buckets {
            let t = code.table as usize;
            if t >= tables {
                return Err(StoreError::integrity(format!(
                    "bucket for hash table {t} but store has {tables} tables"
                )));
            }
            for posting in postings {
                let track_slots = slots.get_mut(&posting.track).ok_or_else(|| {
                    StoreError::integrity(format!("posting references unknown track {}", posting.track))
                })?;
                let slot = track_slots
                    .get_mut(posting.position as usize * tables + t)
                    .ok_or_else(|| {
                        StoreError::integrity(format!(
                            "posting position {} beyond track {} length",
                            posting.position, posting.track
                        ))
                    })?;
                if slot.replace(code.value).is_some() {
                    return Err(StoreError::integrity(format!(
                        "track {} position {} has two codes in table {t}",
                        posting.track, posting.position
                    )));
                }
            }
        }

        for (id, track_slots) in slots {
            let mut record = Vec::with_capacity(track_slots.len() / tables.max(1));
            let silent_here = quiet.remove(&id).unwrap_or_default();
            for (position, chunk) in track_slots.chunks(tables.max(1)).enumerate() {
                let position = position as u32;
                if silent_here.contains(&position) {
                    if chunk.iter().any(Option::is_some) {
                        return Err(StoreError::integrity(format!(
                            "track {id} position {position} is silent but has postings"
                        )));
                    }
                    record.push(SubFingerprint::silent(position, tables));
                    continue;
                }
                let codes: Option<Vec<u32>> = chunk.iter().copied().collect();
                let codes = codes.ok_or_else(|| {
                    StoreError::integrity(format!("track {id} position {position} is missing codes"))
                })?;
                record.push(SubFingerprint::new(position, codes));
            }
            if let Some(entry) = table.entries.get_mut(&id) {
                entry.fingerprints = record.into();
            }
        }

        let index = InvertedIndex::new();
        let rejected = index.import(payload.buckets);
        if rejected > 0 {
            return Err(StoreError::integrity(format!(
                "{rejected} duplicate postings in snapshot"
            )));
        }

        let next_id = payload.next_track_id.max(max_id + 1);
        log::info!("Loaded {} tracks from snapshot", table.entries.len());

        Ok(Self {
            config,
            tracks: RwLock::new(table),
            index,
            next_id: AtomicU32::new(next_id),
            epoch: AtomicU64::new(0),
        })
    }
}

/// Epoch-bounded view used by queries
pub struct ReadView<'a> {
    store: &'a FingerprintStore,
    epoch: u64,
}

impl<'a> ReadView<'a> {
    pub fn lookup_many(&self, codes: &[HashCode]) -> Vec<Vec<Posting>> {
        self.store.lookup_many(codes)
    }

    /// The track if it was committed before the view was taken
    pub fn track(&self, id: TrackId) -> Option<Track> {
        self.store
            .read_tracks()
            .entries
            .get(&id)
            .filter(|e| e.epoch <= self.epoch)
            .map(|e| e.track.clone())
    }

    /// Resolve visibility for many tracks under a single lock
    pub fn visible_tracks(&self, ids: impl IntoIterator<Item = TrackId>) -> HashMap<TrackId, Track> {
        let table = self.store.read_tracks();
        ids.into_iter()
            .filter_map(|id| {
                table
                    .entries
                    .get(&id)
                    .filter(|e| e.epoch <= self.epoch)
                    .map(|e| (id, e.track.clone()))
            })
            .collect()
    }

    /// Total sub-fingerprints in the corpus
    pub fn corpus_size(&self) -> u64 {
        self.store
            .read_tracks()
            .entries
            .values()
            .filter(|e| e.epoch <= self.epoch)
            .map(|e| e.track.fingerprint_count as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FileBackend, MemoryBackend};
    use tempfile::TempDir;

    fn config() -> StoreConfig {
        StoreConfig::new(0xABCD, "tables=2", 2)
    }

    fn record(seed: u32, len: u32) -> Vec<SubFingerprint> {
        (0..len)
            .map(|p| SubFingerprint::new(p, vec![seed.wrapping_mul(31).wrapping_add(p), seed ^ (p * 7)]))
            .collect()
    }

    fn meta(source: &str) -> TrackMeta {
        TrackMeta::new(source, source.trim_start_matches('/'), 10.0)
    }

    #[test]
    fn test_insert_indexes_every_code() {
        let store = FingerprintStore::new(config());
        let fps = record(1, 5);
        let id = store.insert(meta("/a.wav"), fps.clone(), false).unwrap();

        for fp in &fps {
            for code in fp.hash_codes() {
                assert!(store.lookup(code).contains(&Posting::new(id, fp.position)));
            }
        }
        let track = store.track(id).unwrap();
        assert_eq!(track.fingerprint_count, 5);
        assert_eq!(store.stats().sub_fingerprints, 5);
    }

    #[test]
    fn test_duplicate_source_is_rejected() {
        let store = FingerprintStore::new(config());
        let id = store.insert(meta("/a.wav"), record(1, 3), false).unwrap();

        match store.insert(meta("/a.wav"), record(2, 3), false) {
            Err(StoreError::DuplicateTrack { existing, .. }) => assert_eq!(existing, Some(id)),
            other => panic!("expected duplicate error, got {other:?}"),
        }
        assert_eq!(store.track_count(), 1);
        assert!(store.contains_source("/a.wav"));
        assert!(!store.contains_source("/b.wav"));
    }

    #[test]
    fn test_overwrite_replaces_postings() {
        let store = FingerprintStore::new(config());
        let old_fps = record(1, 3);
        let old = store.insert(meta("/a.wav"), old_fps.clone(), false).unwrap();
        let new = store.insert(meta("/a.wav"), record(9, 4), true).unwrap();

        assert_ne!(old, new);
        assert_eq!(store.track_count(), 1);
        assert!(store.track(old).is_none());
        for code in old_fps.iter().flat_map(|fp| fp.hash_codes()) {
            assert!(store.lookup(code).iter().all(|p| p.track != old));
        }
    }

    #[test]
    fn test_silent_sub_fingerprints_are_not_indexed() {
        let store = FingerprintStore::new(config());
        let mut fps = record(1, 4);
        fps[1] = SubFingerprint::silent(1, 2);
        fps[2] = SubFingerprint::silent(2, 2);
        let id = store.insert(meta("/a.wav"), fps, false).unwrap();

        assert!(store.lookup(HashCode::new(0, 0)).is_empty());
        assert!(store.lookup(HashCode::new(1, 0)).is_empty());
        let stats = store.stats();
        assert_eq!(stats.sub_fingerprints, 4);
        assert_eq!(stats.postings, 2 * 2);
        assert_eq!(store.track(id).unwrap().fingerprint_count, 4);

        let noisy = SubFingerprint {
            silent: true,
            ..SubFingerprint::new(0, vec![1, 0])
        };
        assert!(matches!(
            store.insert(meta("/b.wav"), vec![noisy], false),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_snapshot_restores_silent_positions() {
        let backend = MemoryBackend::new();
        let store = FingerprintStore::new(config());
        let mut fps = record(3, 5);
        fps[0] = SubFingerprint::silent(0, 2);
        fps[4] = SubFingerprint::silent(4, 2);
        let id = store.insert(meta("/quiet.wav"), fps.clone(), false).unwrap();
        let stats = store.snapshot(&backend).unwrap();

        let loaded = FingerprintStore::load(&backend, config()).unwrap().unwrap();
        assert_eq!(loaded.stats(), stats);
        assert_eq!(&*loaded.fingerprints_of(id).unwrap(), &fps[..]);
    }

    #[test]
    fn test_malformed_record_is_rejected() {
        let store = FingerprintStore::new(config());
        let gap = vec![SubFingerprint::new(0, vec![1, 2]), SubFingerprint::new(2, vec![3, 4])];
        assert!(matches!(
            store.insert(meta("/a.wav"), gap, false),
            Err(StoreError::InvalidRecord(_))
        ));
        let narrow = vec![SubFingerprint::new(0, vec![1])];
        assert!(matches!(
            store.insert(meta("/a.wav"), narrow, false),
            Err(StoreError::InvalidRecord(_))
        ));
        assert!(!store.contains_source("/a.wav"));
    }

    #[test]
    fn test_search_tracks_matches_title_and_source() {
        let store = FingerprintStore::new(config());
        store.insert(meta("/music/Blue Monday.wav"), record(1, 2), false).unwrap();
        store.insert(meta("/music/Other.wav"), record(2, 2), false).unwrap();

        let hits = store.search_tracks("blue");
        assert_eq!(hits.len(), 1);
        assert!(hits[0].title.contains("Blue Monday"));
        assert_eq!(store.search_tracks("MUSIC").len(), 2);
        assert!(store.search_tracks("  ").is_empty());
    }

    #[test]
    fn test_read_view_hides_later_commits() {
        let store = FingerprintStore::new(config());
        let first = store.insert(meta("/a.wav"), record(1, 2), false).unwrap();
        let view = store.read_view();
        let second = store.insert(meta("/b.wav"), record(2, 2), false).unwrap();

        assert!(view.track(first).is_some());
        assert!(view.track(second).is_none());
        assert_eq!(view.corpus_size(), 2);
        assert!(store.read_view().track(second).is_some());
    }

    #[test]
    fn test_snapshot_and_load_restore_everything() {
        let backend = MemoryBackend::new();
        let store = FingerprintStore::new(config());
        let a = store.insert(meta("/a.wav"), record(1, 6), false).unwrap();
        let b = store.insert(meta("/b.wav"), record(2, 4), false).unwrap();
        let stats = store.snapshot(&backend).unwrap();

        let loaded = FingerprintStore::load(&backend, config()).unwrap().unwrap();
        assert_eq!(loaded.stats(), stats);
        assert_eq!(loaded.tracks(), store.tracks());
        assert_eq!(&*loaded.fingerprints_of(a).unwrap(), &*store.fingerprints_of(a).unwrap());
        assert_eq!(&*loaded.fingerprints_of(b).unwrap(), &*store.fingerprints_of(b).unwrap());

        // Ids keep increasing after a reload
        let c = loaded.insert(meta("/c.wav"), record(3, 1), false).unwrap();
        assert!(c > b);

        let manifest = StoreManifest::load(&backend).unwrap().unwrap();
        assert_eq!(manifest.stats.tracks, 2);
    }

    #[test]
    fn test_load_rejects_other_configuration() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path());
        let store = FingerprintStore::new(config());
        store.insert(meta("/a.wav"), record(1, 3), false).unwrap();
        store.snapshot(&backend).unwrap();

        let other = StoreConfig::new(0x1234, "tables=2", 2);
        assert!(matches!(
            FingerprintStore::load(&backend, other),
            Err(StoreError::ConfigMismatch { .. })
        ));
    }

    #[test]
    fn test_load_rejects_torn_snapshot() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path());
        let store = FingerprintStore::new(config());
        store.insert(meta("/a.wav"), record(1, 30), false).unwrap();
        store.snapshot(&backend).unwrap();

        let path = backend.snapshot_path();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            FingerprintStore::load(&backend, config()),
            Err(StoreError::Integrity(_))
        ));
    }

    #[test]
    fn test_open_without_snapshot_is_empty() {
        let backend = MemoryBackend::new();
        let store = FingerprintStore::open(&backend, config()).unwrap();
        assert_eq!(store.track_count(), 0);
    }

    #[test]
    fn test_concurrent_inserts_lose_nothing() {
        let store = FingerprintStore::new(config());
        let n = 16u32;
        std::thread::scope(|scope| {
            for i in 0..n {
                let store = &store;
                scope.spawn(move || {
                    store
                        .insert(meta(&format!("/t{i}.wav")), record(i, 50), false)
                        .unwrap();
                });
            }
        });

        let stats = store.stats();
        assert_eq!(stats.tracks, n as usize);
        assert_eq!(stats.sub_fingerprints, (n * 50) as u64);
        // Two codes per sub-fingerprint, every (track, position) pair distinct
        assert_eq!(stats.postings, (n * 50 * 2) as u64);
    }

    #[test]
    fn test_concurrent_same_source_inserts_once() {
        let store = FingerprintStore::new(config());
        let successes = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for i in 0..8u32 {
                let store = &store;
                let successes = &successes;
                scope.spawn(move || {
                    if store.insert(meta("/same.wav"), record(i, 10), false).is_ok() {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(store.track_count(), 1);
    }
}
