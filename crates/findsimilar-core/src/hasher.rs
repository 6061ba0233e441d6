//! Sub-fingerprint hashing
//!
//! A block of `block_frames` consecutive spectral frames is split into two
//! halves. For every band pair `(a, b)` of [`BAND_PAIRS`] one signature bit is
//! set when the energy difference between `a` and `b` grows from the first
//! half to the second. The signature bits are packed into
//! `codes_per_block` codes of `code_bits` bits.
//!
//! A block where no compared difference changes at all (digital silence, a
//! perfectly steady signal) carries no information and is marked silent.

use crate::config::FingerprintConfig;
use crate::spectrogram::SpectralFrame;
use findsimilar_store::SubFingerprint;

/// Version of [`BAND_PAIRS`]; part of the configuration fingerprint
pub const PAIR_TABLE_VERSION: u16 = 1;

/// Band pairs compared per signature bit, in bit order
pub const BAND_PAIRS: [(u8, u8); 64] = build_band_pairs();

const fn build_band_pairs() -> [(u8, u8); 64] {
    let mut pairs = [(0u8, 0u8); 64];
    let mut k = 0;

    // Adjacent bands
    let mut b = 0;
    while b < 31 {
        pairs[k] = (b, b + 1);
        k += 1;
        b += 1;
    }
    // One band apart
    b = 0;
    while b < 30 {
        pairs[k] = (b, b + 2);
        k += 1;
        b += 1;
    }
    // Wide spans
    pairs[k] = (0, 31);
    pairs[k + 1] = (8, 24);
    pairs[k + 2] = (4, 20);
    pairs
}

/// Turns spectral frames into sub-fingerprints
#[derive(Debug, Clone)]
pub struct Hasher {
    block_frames: usize,
    codes_per_block: usize,
    code_bits: u32,
}

impl Hasher {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            block_frames: config.block_frames.max(2),
            codes_per_block: config.codes_per_block,
            code_bits: config.code_bits.clamp(1, 32),
        }
    }

    /// Lazy sequence of sub-fingerprints, one per block position
    pub fn hash<'a>(&self, frames: &'a [SpectralFrame]) -> SubFingerprints<'a> {
        SubFingerprints {
            hasher: self.clone(),
            frames,
            position: 0,
        }
    }

    /// Number of sub-fingerprints produced for `frame_count` frames
    pub fn count_for(&self, frame_count: usize) -> usize {
        if frame_count < self.block_frames {
            0
        } else {
            frame_count - self.block_frames + 1
        }
    }

    fn hash_block(&self, position: u32, block: &[SpectralFrame]) -> SubFingerprint {
        let half = self.block_frames / 2;
        let bands = block.iter().map(|f| f.magnitudes.len()).min().unwrap_or(0);

        let first = band_energy(&block[..half], bands);
        let second = band_energy(&block[half..], bands);

        let mut codes = vec![0u32; self.codes_per_block];
        let bits = self.codes_per_block * self.code_bits as usize;
        let mut changed = false;

        for (k, &(a, b)) in BAND_PAIRS.iter().enumerate().take(bits) {
            let (a, b) = (a as usize, b as usize);
            if a >= bands || b >= bands {
                continue;
            }
            let delta = (first[a] - first[b]) - (second[a] - second[b]);
            changed |= delta != 0.0;
            if delta > 0.0 {
                let code = k / self.code_bits as usize;
                codes[code] |= 1 << (k % self.code_bits as usize);
            }
        }

        if changed {
            SubFingerprint::new(position, codes)
        } else {
            SubFingerprint::silent(position, self.codes_per_block)
        }
    }
}

/// Per-band sum of magnitudes over `frames`
fn band_energy(frames: &[SpectralFrame], bands: usize) -> Vec<f32> {
    let mut energy = vec![0.0f32; bands];
    for frame in frames {
        for (e, m) in energy.iter_mut().zip(&frame.magnitudes) {
            *e += m;
        }
    }
    energy
}

/// Iterator over the sub-fingerprints of a frame sequence
pub struct SubFingerprints<'a> {
    hasher: Hasher,
    frames: &'a [SpectralFrame],
    position: usize,
}

impl Iterator for SubFingerprints<'_> {
    type Item = SubFingerprint;

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.position + self.hasher.block_frames;
        if end > self.frames.len() {
            return None;
        }
        let fingerprint = self
            .hasher
            .hash_block(self.position as u32, &self.frames[self.position..end]);
        self.position += 1;
        Some(fingerprint)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .hasher
            .count_for(self.frames.len())
            .saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SubFingerprints<'_> {}
