//! Sample rate conversion using rubato's FFT resampler

use crate::error::{FingerprintError, Result};
use rubato::{FftFixedIn, Resampler};

/// Input chunk size handed to the resampler
const CHUNK_FRAMES: usize = 1024;

/// Resample mono audio to the target sample rate
///
/// The output is aligned with the input (resampler delay removed) and holds
/// `len * to_rate / from_rate` samples.
pub fn resample_to_target(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 {
        return Err(FingerprintError::InvalidSampleRate(from_rate));
    }
    if to_rate == 0 {
        return Err(FingerprintError::InvalidSampleRate(to_rate));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_FRAMES, 2, 1)
            .map_err(|e| FingerprintError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut output = Vec::with_capacity(expected + delay);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let input = [&samples[pos..pos + n]];
        let out = resampler
            .process(&input[..], None)
            .map_err(|e| FingerprintError::Resample(e.to_string()))?;
        output.extend_from_slice(&out[0]);
        pos += n;
    }

    if pos < samples.len() {
        let input = [&samples[pos..]];
        let out = resampler
            .process_partial(Some(&input[..]), None)
            .map_err(|e| FingerprintError::Resample(e.to_string()))?;
        output.extend_from_slice(&out[0]);
    }

    // Flush the delay line
    while output.len() < expected + delay {
        let out = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| FingerprintError::Resample(e.to_string()))?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_identity() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_to_target(&samples, 5512, 5512).unwrap(), samples);
    }

    #[test]
    fn test_downsample_length() {
        let samples: Vec<f32> = (0..44100).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = resample_to_target(&samples, 44100, 5512).unwrap();
        assert_eq!(out.len(), 5512);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(matches!(
            resample_to_target(&[0.0; 8], 0, 5512),
            Err(FingerprintError::InvalidSampleRate(0))
        ));
    }
}
