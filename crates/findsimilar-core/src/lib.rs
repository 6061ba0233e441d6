//! FindSimilar Core - content-based audio search
//!
//! Decodes audio, builds log-frequency spectrograms, hashes them into
//! sub-fingerprints and matches queries against a [`FingerprintStore`] by
//! offset voting.

pub mod audio;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod hasher;
pub mod matching;
pub mod scan;
pub mod settings;
pub mod spectrogram;

pub use config::{FingerprintConfig, MatchConfig};
pub use error::FingerprintError;
pub use fingerprint::{FileFingerprint, Fingerprinter};
pub use hasher::{Hasher, BAND_PAIRS, PAIR_TABLE_VERSION};
pub use matching::{CollisionModel, CoverageEstimator, CoverageInput, MatchResult, Matcher};
pub use scan::{FileOutcome, FileReport, ScanOptions, ScanReport, Scanner, SkipReason};
pub use settings::Settings;
pub use spectrogram::{build_spectrogram, SpectralFrame, SpectrogramBuilder};

use findsimilar_store::{FingerprintStore, SubFingerprint};
use std::path::Path;

/// Generate sub-fingerprints from an audio file
pub fn generate_fingerprints(
    audio_path: &Path,
    config: &FingerprintConfig,
) -> anyhow::Result<Vec<SubFingerprint>> {
    config.validate()?;
    let audio = audio::decode_audio(audio_path)?;
    let fingerprinter = Fingerprinter::new(config)?;
    match fingerprinter.fingerprint_audio(&audio) {
        Err(FingerprintError::EmptyInput) => Ok(Vec::new()),
        other => Ok(other?),
    }
}

/// Fingerprint a query file and rank the stored tracks against it
///
/// A query without audio, or too short for one sub-fingerprint, yields no
/// results.
pub fn match_file(
    store: &FingerprintStore,
    query_path: &Path,
    config: &FingerprintConfig,
    match_config: &MatchConfig,
) -> anyhow::Result<Vec<MatchResult>> {
    if config.fingerprint() != store.config().config_fingerprint {
        anyhow::bail!("store was built with a different fingerprint configuration");
    }
    let query = generate_fingerprints(query_path, config)?;
    log::info!(
        "Query {}: {} sub-fingerprints",
        query_path.display(),
        query.len()
    );
    let matcher = Matcher::new(store, config, match_config.clone());
    Ok(matcher.query(&query))
}
