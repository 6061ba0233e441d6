//! Configuration parameters for fingerprinting and matching
//!
//! A `FingerprintConfig` is fixed once a store has been built with it: its
//! fingerprint is persisted with every snapshot and checked on load.

use crate::hasher::{BAND_PAIRS, PAIR_TABLE_VERSION};
use crc::{Crc, CRC_64_ECMA_182};
use serde::{Deserialize, Serialize};

const CONFIG_CRC: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Spectrogram and hashing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    // Audio processing
    pub sample_rate: u32,

    // Spectrogram
    pub window_size: usize,
    pub hop_size: usize,
    pub log_bins: usize,
    pub min_freq: f32,
    pub max_freq: f32,
    /// Floor applied before taking magnitudes to dB
    pub log_floor_db: f32,

    // Sub-fingerprint hashing
    pub block_frames: usize,
    pub codes_per_block: usize,
    pub code_bits: u32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            // 5512 Hz keeps everything up to 2.7 kHz, enough for the band range
            sample_rate: 5512,

            window_size: 2048,
            hop_size: 64,
            log_bins: 32,
            min_freq: 318.0,
            max_freq: 2000.0,
            log_floor_db: -90.0,

            block_frames: 16,
            codes_per_block: 4,
            code_bits: 16,
        }
    }
}

impl FingerprintConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sample_rate == 0 {
            anyhow::bail!("Sample rate must be > 0");
        }
        if self.window_size < 2 || self.hop_size == 0 {
            anyhow::bail!("window_size must be >= 2 and hop_size > 0");
        }
        if self.min_freq <= 0.0 || self.min_freq >= self.max_freq {
            anyhow::bail!("min_freq must be > 0 and < max_freq");
        }
        if self.max_freq > self.sample_rate as f32 / 2.0 {
            anyhow::bail!(
                "max_freq {} exceeds Nyquist frequency {}",
                self.max_freq,
                self.sample_rate as f32 / 2.0
            );
        }
        if !self.log_floor_db.is_finite() {
            anyhow::bail!("log_floor_db must be finite");
        }
        let max_band = BAND_PAIRS
            .iter()
            .map(|&(a, b)| a.max(b) as usize)
            .max()
            .unwrap_or(0);
        if self.log_bins <= max_band {
            anyhow::bail!(
                "log_bins must be > {} for band-pair table v{}",
                max_band,
                PAIR_TABLE_VERSION
            );
        }
        if self.block_frames < 2 {
            anyhow::bail!("block_frames must be >= 2");
        }
        if self.code_bits == 0 || self.code_bits > 32 {
            anyhow::bail!("code_bits must be in 1..=32");
        }
        if self.codes_per_block == 0 {
            anyhow::bail!("codes_per_block must be > 0");
        }
        if self.signature_bits() > BAND_PAIRS.len() {
            anyhow::bail!(
                "{} codes x {} bits need {} signature bits, table v{} has {}",
                self.codes_per_block,
                self.code_bits,
                self.signature_bits(),
                PAIR_TABLE_VERSION,
                BAND_PAIRS.len()
            );
        }
        Ok(())
    }

    /// Number of signature bits packed into codes per block
    pub fn signature_bits(&self) -> usize {
        self.codes_per_block * self.code_bits as usize
    }

    /// Seconds between consecutive frames (and sub-fingerprints)
    pub fn frame_duration_secs(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }

    /// Canonical text form of every parameter that affects the codes
    pub fn descriptor(&self) -> String {
        format!(
            "pairs=v{};sr={};win={};hop={};bins={};fmin={};fmax={};floor={};block={};codes={}x{}",
            PAIR_TABLE_VERSION,
            self.sample_rate,
            self.window_size,
            self.hop_size,
            self.log_bins,
            self.min_freq,
            self.max_freq,
            self.log_floor_db,
            self.block_frames,
            self.codes_per_block,
            self.code_bits
        )
    }

    /// CRC-64 of the descriptor; stored with snapshots to detect incompatibility
    pub fn fingerprint(&self) -> u64 {
        CONFIG_CRC.checksum(self.descriptor().as_bytes())
    }
}

/// Matching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum votes in a track's best offset bin
    pub threshold_votes: usize,
    pub max_results: usize,
    /// Largest gap (in sub-fingerprints) still counted as one aligned run
    pub max_gap_frames: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold_votes: 4,
            max_results: 25,
            max_gap_frames: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        FingerprintConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let mut config = FingerprintConfig::default();
        config.max_freq = 4000.0;
        assert!(config.validate().is_err());

        let mut config = FingerprintConfig::default();
        config.code_bits = 40;
        assert!(config.validate().is_err());

        let mut config = FingerprintConfig::default();
        config.codes_per_block = 5;
        assert!(config.validate().is_err());

        let mut config = FingerprintConfig::default();
        config.log_bins = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fingerprint_tracks_hashing_parameters() {
        let base = FingerprintConfig::default();
        assert_eq!(base.fingerprint(), FingerprintConfig::default().fingerprint());

        let mut other = base.clone();
        other.code_bits = 8;
        assert_ne!(base.fingerprint(), other.fingerprint());

        let mut other = base.clone();
        other.hop_size = 32;
        assert_ne!(base.fingerprint(), other.fingerprint());
    }
}
