//! Fingerprinting pipeline
//!
//! PCM → mono → working sample rate → spectrogram → sub-fingerprints.

use crate::audio::{resample_to_target, AudioData, AudioDecoder};
use crate::config::FingerprintConfig;
use crate::error::{FingerprintError, Result};
use crate::hasher::Hasher;
use crate::spectrogram::SpectrogramBuilder;
use findsimilar_store::SubFingerprint;
use std::path::Path;

/// Sub-fingerprints of one decoded file
#[derive(Debug, Clone)]
pub struct FileFingerprint {
    pub duration_secs: f64,
    pub sub_fingerprints: Vec<SubFingerprint>,
}

/// Shared, thread-safe fingerprint generator for one configuration
pub struct Fingerprinter {
    config: FingerprintConfig,
    spectrogram: SpectrogramBuilder,
    hasher: Hasher,
}

impl Fingerprinter {
    pub fn new(config: &FingerprintConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            spectrogram: SpectrogramBuilder::new(config, config.sample_rate)?,
            hasher: Hasher::new(config),
        })
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Fingerprint mono samples recorded at `sample_rate`
    ///
    /// Fails with `EmptyInput` for an empty sequence. Input shorter than one
    /// block yields no sub-fingerprints.
    pub fn fingerprint_samples(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<SubFingerprint>> {
        if sample_rate == 0 {
            return Err(FingerprintError::InvalidSampleRate(sample_rate));
        }
        if samples.is_empty() {
            return Err(FingerprintError::EmptyInput);
        }

        let resampled;
        let samples = if sample_rate == self.config.sample_rate {
            samples
        } else {
            resampled = resample_to_target(samples, sample_rate, self.config.sample_rate)?;
            &resampled[..]
        };

        let frames = self.spectrogram.build(samples)?;
        let sub_fingerprints: Vec<_> = self.hasher.hash(&frames).collect();
        log::trace!(
            "{} samples -> {} frames -> {} sub-fingerprints",
            samples.len(),
            frames.len(),
            sub_fingerprints.len()
        );
        Ok(sub_fingerprints)
    }

    /// Fingerprint decoded audio, downmixing to mono first
    pub fn fingerprint_audio(&self, audio: &AudioData) -> Result<Vec<SubFingerprint>> {
        self.fingerprint_samples(&audio.to_mono(), audio.sample_rate)
    }

    /// Decode and fingerprint a file
    pub fn fingerprint_file(&self, decoder: &dyn AudioDecoder, path: &Path) -> Result<FileFingerprint> {
        let audio = decoder.decode(path)?;
        Ok(FileFingerprint {
            duration_secs: audio.duration_secs(),
            sub_fingerprints: self.fingerprint_audio(&audio)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize, seed: u32) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    #[test]
    fn test_fingerprint_count_follows_frame_count() {
        let config = FingerprintConfig::default();
        let fingerprinter = Fingerprinter::new(&config).unwrap();
        let samples = noise(config.window_size + 99 * config.hop_size, 3);

        let subs = fingerprinter.fingerprint_samples(&samples, config.sample_rate).unwrap();
        // 100 frames, block of 16
        assert_eq!(subs.len(), 100 - config.block_frames + 1);
    }

    #[test]
    fn test_short_and_empty_input() {
        let config = FingerprintConfig::default();
        let fingerprinter = Fingerprinter::new(&config).unwrap();

        let short = fingerprinter.fingerprint_samples(&noise(100, 1), config.sample_rate).unwrap();
        assert!(short.is_empty());

        assert!(matches!(
            fingerprinter.fingerprint_samples(&[], config.sample_rate),
            Err(FingerprintError::EmptyInput)
        ));
    }

    #[test]
    fn test_stereo_identical_channels_match_mono() {
        let config = FingerprintConfig::default();
        let fingerprinter = Fingerprinter::new(&config).unwrap();
        let mono = noise(8192, 9);
        let stereo: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();

        let a = fingerprinter.fingerprint_audio(&AudioData::mono(mono, config.sample_rate)).unwrap();
        let b = fingerprinter
            .fingerprint_audio(&AudioData::new(stereo, config.sample_rate, 2))
            .unwrap();
        assert_eq!(a, b);
    }
}
