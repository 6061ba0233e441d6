//! Log-frequency spectrogram
//!
//! Windowed FFT frames (Hann window) whose linear magnitude spectrum is
//! averaged into log-spaced bands between `min_freq` and `max_freq`, then
//! expressed in dB above `log_floor_db`.

use crate::config::FingerprintConfig;
use crate::error::{FingerprintError, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::ops::Range;
use std::sync::Arc;

/// One windowed FFT mapped onto log-frequency bands
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    pub index: usize,
    /// Non-negative band magnitudes, dB above the floor
    pub magnitudes: Vec<f32>,
}

/// Number of frames produced for `sample_count` samples
pub fn frame_count(sample_count: usize, window_size: usize, hop_size: usize) -> usize {
    if sample_count < window_size || hop_size == 0 {
        0
    } else {
        (sample_count - window_size) / hop_size + 1
    }
}

/// Build the spectrogram of a mono sample sequence
pub fn build_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    config: &FingerprintConfig,
) -> Result<Vec<SpectralFrame>> {
    SpectrogramBuilder::new(config, sample_rate)?.build(samples)
}

/// Reusable FFT plan, window and band layout for one sample rate
pub struct SpectrogramBuilder {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Scales |X| so a full-scale sine reads ~1.0
    norm: f32,
    bands: Vec<Range<usize>>,
    hop_size: usize,
    floor_db: f32,
}

impl SpectrogramBuilder {
    pub fn new(config: &FingerprintConfig, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(FingerprintError::InvalidSampleRate(sample_rate));
        }

        let window_size = config.window_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);

        let window = create_hann_window(window_size);
        let window_sum: f32 = window.iter().sum();
        let norm = if window_sum > 0.0 { 2.0 / window_sum } else { 0.0 };

        let bands = log_band_ranges(
            config.min_freq,
            config.max_freq,
            config.log_bins,
            window_size,
            sample_rate,
        );

        Ok(Self {
            fft,
            window,
            norm,
            bands,
            hop_size: config.hop_size,
            floor_db: config.log_floor_db,
        })
    }

    /// FFT bin ranges averaged into each band
    pub fn band_ranges(&self) -> &[Range<usize>] {
        &self.bands
    }

    pub fn build(&self, samples: &[f32]) -> Result<Vec<SpectralFrame>> {
        if samples.is_empty() {
            return Err(FingerprintError::EmptyInput);
        }

        let window_size = self.window.len();
        let num_frames = frame_count(samples.len(), window_size, self.hop_size);

        let mut frames = Vec::with_capacity(num_frames);
        let mut buffer = vec![Complex::new(0.0f32, 0.0); window_size];
        let mut spectrum = vec![0.0f32; window_size / 2 + 1];

        for index in 0..num_frames {
            let start = index * self.hop_size;
            let frame = &samples[start..start + window_size];

            for ((slot, &s), &w) in buffer.iter_mut().zip(frame).zip(&self.window) {
                *slot = Complex::new(s * w, 0.0);
            }
            self.fft.process(&mut buffer);

            for (mag, bin) in spectrum.iter_mut().zip(&buffer) {
                *mag = bin.norm() * self.norm;
            }

            frames.push(SpectralFrame {
                index,
                magnitudes: self.to_log_bands(&spectrum),
            });
        }

        Ok(frames)
    }

    fn to_log_bands(&self, spectrum: &[f32]) -> Vec<f32> {
        self.bands
            .iter()
            .map(|range| {
                let bins = &spectrum[range.clone()];
                let mean = bins.iter().sum::<f32>() / bins.len() as f32;
                let db = if mean > 0.0 {
                    20.0 * mean.log10()
                } else {
                    self.floor_db
                };
                // Floor first so log(0) and denormals never leak out
                db.max(self.floor_db) - self.floor_db
            })
            .collect()
    }
}

/// Create Hann window
fn create_hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            let x = i as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}

/// FFT bin ranges for `num_bands` log-spaced bands; each band is non-empty
fn log_band_ranges(
    min_freq: f32,
    max_freq: f32,
    num_bands: usize,
    window_size: usize,
    sample_rate: u32,
) -> Vec<Range<usize>> {
    let bins_per_hz = window_size as f32 / sample_rate as f32;
    let last_bin = window_size / 2 + 1;
    let ratio = max_freq / min_freq;

    let edge = |i: usize| -> usize {
        let freq = min_freq * ratio.powf(i as f32 / num_bands as f32);
        ((freq * bins_per_hz).round() as usize).min(last_bin - 1)
    };

    (0..num_bands)
        .map(|i| {
            let lo = edge(i);
            let hi = edge(i + 1).max(lo + 1).min(last_bin);
            lo..hi
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_hann_window() {
        let window = create_hann_window(513);
        assert_eq!(window.len(), 513);
        assert!((window[0] - 0.0).abs() < 0.001);
        assert!((window[256] - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_frame_count_law() {
        let config = FingerprintConfig::default();
        let builder = SpectrogramBuilder::new(&config, config.sample_rate).unwrap();
        let (w, h) = (config.window_size, config.hop_size);

        for len in [1, w - 1, w, w + h - 1, w + h, w + 10 * h + 7] {
            let frames = builder.build(&vec![0.1; len]).unwrap();
            assert_eq!(frames.len(), frame_count(len, w, h));
        }
        assert_eq!(frame_count(w - 1, w, h), 0);
        assert_eq!(frame_count(w, w, h), 1);
        assert_eq!(frame_count(w + 10 * h + 7, w, h), 11);
    }

    #[test]
    fn test_silence_is_zero_not_nan() {
        let config = FingerprintConfig::default();
        let frames = build_spectrogram(&vec![0.0; 4096], config.sample_rate, &config).unwrap();
        assert!(!frames.is_empty());
        for frame in &frames {
            assert_eq!(frame.magnitudes.len(), config.log_bins);
            assert!(frame.magnitudes.iter().all(|&m| m == 0.0));
        }
    }

    #[test]
    fn test_magnitudes_are_finite_and_non_negative() {
        let config = FingerprintConfig::default();
        let samples: Vec<f32> = (0..6000).map(|i| ((i * 7919) % 1013) as f32 / 1013.0 - 0.5).collect();
        let frames = build_spectrogram(&samples, config.sample_rate, &config).unwrap();
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, i);
            assert!(frame.magnitudes.iter().all(|m| m.is_finite() && *m >= 0.0));
        }
    }

    #[test]
    fn test_tone_peaks_in_its_band() {
        let config = FingerprintConfig::default();
        let builder = SpectrogramBuilder::new(&config, config.sample_rate).unwrap();
        let frames = builder.build(&tone(1000.0, config.sample_rate, 4096)).unwrap();

        let peak_bin = (1000.0 * config.window_size as f32 / config.sample_rate as f32).round() as usize;
        for frame in &frames {
            let loudest = frame
                .magnitudes
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
            assert!(builder.band_ranges()[loudest].contains(&peak_bin));
        }
    }

    #[test]
    fn test_bands_are_non_empty_and_ordered() {
        let config = FingerprintConfig::default();
        let builder = SpectrogramBuilder::new(&config, config.sample_rate).unwrap();
        let bands = builder.band_ranges();
        assert_eq!(bands.len(), config.log_bins);
        for pair in bands.windows(2) {
            assert!(!pair[0].is_empty());
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn test_invalid_input() {
        let config = FingerprintConfig::default();
        assert!(matches!(
            build_spectrogram(&[], config.sample_rate, &config),
            Err(FingerprintError::EmptyInput)
        ));
        assert!(matches!(
            build_spectrogram(&[0.0; 4096], 0, &config),
            Err(FingerprintError::InvalidSampleRate(0))
        ));
    }
}
