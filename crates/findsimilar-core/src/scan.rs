//! Directory scanning
//!
//! Walks a directory tree, fingerprints every supported audio file on a
//! bounded rayon pool and commits the results to the store. Each file ends in
//! an explicit [`FileOutcome`]; a failing file never stops the scan.

use crate::audio::{AudioDecoder, AudioFormat, FileDecoder};
use crate::config::FingerprintConfig;
use crate::error::FingerprintError;
use crate::fingerprint::Fingerprinter;
use anyhow::{Context, Result};
use findsimilar_store::{FingerprintStore, StoreError, TrackId, TrackMeta};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// Scan behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Skip files longer than this many seconds (0 = no limit)
    pub skip_duration_above_secs: f64,
    /// Worker threads (0 = hardware concurrency)
    pub threads: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            skip_duration_above_secs: 0.0,
            threads: 0,
        }
    }
}

/// Why a file was not indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyIndexed,
    TooLong,
    /// No samples, or too short for a single sub-fingerprint
    Empty,
    DecodeFailed,
    FingerprintFailed,
    InsertFailed,
}

/// Result of processing one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Indexed(TrackId),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}

/// Aggregated outcome of a scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub files: Vec<FileReport>,
    /// Number of tracks added to the store
    pub added: usize,
    pub elapsed_secs: f64,
}

impl ScanReport {
    fn from_files(files: Vec<FileReport>, elapsed_secs: f64) -> Self {
        let added = files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Indexed(_)))
            .count();
        Self {
            files,
            added,
            elapsed_secs,
        }
    }

    pub fn skipped(&self) -> usize {
        self.files.len() - self.added
    }

    /// Number of files skipped for `reason`
    pub fn count(&self, reason: SkipReason) -> usize {
        self.files
            .iter()
            .filter(|f| f.outcome == FileOutcome::Skipped(reason))
            .count()
    }
}

/// Scan orchestrator bound to one store
pub struct Scanner<'a> {
    store: &'a FingerprintStore,
    fingerprinter: Fingerprinter,
    decoder: Box<dyn AudioDecoder>,
    options: ScanOptions,
}

impl<'a> Scanner<'a> {
    pub fn new(store: &'a FingerprintStore, config: &FingerprintConfig, options: ScanOptions) -> Result<Self> {
        config.validate()?;
        if config.fingerprint() != store.config().config_fingerprint {
            anyhow::bail!("store was built with a different fingerprint configuration");
        }
        Ok(Self {
            store,
            fingerprinter: Fingerprinter::new(config)?,
            decoder: Box::new(FileDecoder),
            options,
        })
    }

    /// Replace the audio decode collaborator
    pub fn with_decoder(mut self, decoder: Box<dyn AudioDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Recursively index every supported audio file under `dir`
    pub fn scan_directory(&self, dir: &Path) -> Result<ScanReport> {
        if !dir.is_dir() {
            anyhow::bail!("not a directory: {}", dir.display());
        }
        let files = collect_audio_files(dir);
        log::info!("Found {} audio files in {}", files.len(), dir.display());
        self.scan_files(&files)
    }

    /// Index the given files on the worker pool
    pub fn scan_files(&self, files: &[PathBuf]) -> Result<ScanReport> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads)
            .build()
            .context("Failed to build scan thread pool")?;

        let reports: Vec<FileReport> = pool.install(|| {
            files
                .par_iter()
                .map(|path| FileReport {
                    path: path.clone(),
                    outcome: self.process_file(path),
                })
                .collect()
        });

        let report = ScanReport::from_files(reports, start.elapsed().as_secs_f64());
        log::info!(
            "Scan finished: {} added, {} skipped in {:.2}s",
            report.added,
            report.skipped(),
            report.elapsed_secs
        );
        Ok(report)
    }

    /// Decide, fingerprint and commit a single file
    pub fn process_file(&self, path: &Path) -> FileOutcome {
        let source = source_identity(path);
        if self.store.contains_source(&source) {
            log::info!("Skipping {}: already indexed", path.display());
            return FileOutcome::Skipped(SkipReason::AlreadyIndexed);
        }

        let audio = match self.decoder.decode(path) {
            Ok(audio) => audio,
            Err(e) => {
                log::warn!("Failed to decode {}: {}", path.display(), e);
                return FileOutcome::Skipped(SkipReason::DecodeFailed);
            }
        };

        let duration = audio.duration_secs();
        let limit = self.options.skip_duration_above_secs;
        if limit > 0.0 && duration > limit {
            log::info!(
                "Skipping {}: {:.1}s exceeds {:.1}s limit",
                path.display(),
                duration,
                limit
            );
            return FileOutcome::Skipped(SkipReason::TooLong);
        }

        let sub_fingerprints = match self.fingerprinter.fingerprint_audio(&audio) {
            Ok(subs) if subs.is_empty() => {
                log::info!("Skipping {}: too short to fingerprint", path.display());
                return FileOutcome::Skipped(SkipReason::Empty);
            }
            Ok(subs) => subs,
            Err(FingerprintError::EmptyInput) => {
                log::info!("Skipping {}: no audio samples", path.display());
                return FileOutcome::Skipped(SkipReason::Empty);
            }
            Err(e) => {
                log::warn!("Failed to fingerprint {}: {}", path.display(), e);
                return FileOutcome::Skipped(SkipReason::FingerprintFailed);
            }
        };

        let count = sub_fingerprints.len();
        let meta = TrackMeta::new(source, track_title(path), duration);
        match self.store.insert(meta, sub_fingerprints, false) {
            Ok(id) => {
                log::info!("Indexed {} as track {} ({} sub-fingerprints)", path.display(), id, count);
                FileOutcome::Indexed(id)
            }
            Err(StoreError::DuplicateTrack { .. }) => {
                log::info!("Skipping {}: indexed concurrently", path.display());
                FileOutcome::Skipped(SkipReason::AlreadyIndexed)
            }
            Err(e) => {
                log::warn!("Failed to store {}: {}", path.display(), e);
                FileOutcome::Skipped(SkipReason::InsertFailed)
            }
        }
    }
}

/// Supported audio files under `dir`, sorted by path
pub fn collect_audio_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| AudioFormat::from_path(e.path()).is_supported())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Identity used for duplicate detection: the canonical path
pub fn source_identity(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn track_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
