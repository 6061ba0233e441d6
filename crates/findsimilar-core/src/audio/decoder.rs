//! Audio decoding for multiple formats

use super::AudioFormat;
use crate::error::{FingerprintError, Result};
use std::path::Path;

/// Decoded audio data (interleaved samples)
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u32,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        let duration_ms = if sample_rate == 0 {
            0
        } else {
            (frames as f64 / sample_rate as f64 * 1000.0) as u32
        };
        Self {
            samples,
            sample_rate,
            channels,
            duration_ms,
        }
    }

    /// Build from mono samples
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let mut mono = Vec::with_capacity(self.samples.len() / self.channels as usize);
        for chunk in self.samples.chunks(self.channels as usize) {
            let avg: f32 = chunk.iter().sum::<f32>() / chunk.len() as f32;
            mono.push(avg);
        }
        mono
    }
}

/// Source of decoded PCM for a file path
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<AudioData>;
}

/// Decodes audio files from disk by extension
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecoder;

impl AudioDecoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<AudioData> {
        decode_audio(path)
    }
}

/// Decode an audio file at its native sample rate and channel layout
pub fn decode_audio(path: &Path) -> Result<AudioData> {
    if !path.exists() {
        return Err(FingerprintError::NotFound(path.to_path_buf()));
    }

    let audio = match AudioFormat::from_path(path) {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Mp3 => decode_mp3(path)?,
        AudioFormat::Flac => decode_flac(path)?,
        AudioFormat::Ogg => decode_ogg(path)?,
        AudioFormat::Unknown => {
            return Err(FingerprintError::UnsupportedFormat(path.to_path_buf()));
        }
    };

    if audio.sample_rate == 0 || audio.channels == 0 {
        return Err(FingerprintError::decode(
            path,
            format!(
                "invalid stream parameters: {} Hz, {} channels",
                audio.sample_rate, audio.channels
            ),
        ));
    }

    Ok(audio)
}

/// Decode WAV file
fn decode_wav(path: &Path) -> Result<AudioData> {
    let mut reader = hound::WavReader::open(path).map_err(|e| FingerprintError::decode(path, e))?;

    let spec = reader.spec();

    // Read samples and convert to f32
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| FingerprintError::decode(path, e))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| FingerprintError::decode(path, e))?
        }
    };

    Ok(AudioData::new(samples, spec.sample_rate, spec.channels))
}

/// Decode MP3 file
fn decode_mp3(path: &Path) -> Result<AudioData> {
    let data = std::fs::read(path)?;

    let mut decoder = minimp3::Decoder::new(&data[..]);
    let mut samples = Vec::new();
    let mut sample_rate = 0;
    let mut channels = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                    channels = frame.channels as u16;
                }
                // Convert i16 to f32
                samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(FingerprintError::decode(path, e)),
        }
    }

    Ok(AudioData::new(samples, sample_rate, channels))
}

/// Decode FLAC file
fn decode_flac(path: &Path) -> Result<AudioData> {
    let mut reader = claxon::FlacReader::open(path).map_err(|e| FingerprintError::decode(path, e))?;

    let info = reader.streaminfo();
    let max_val = (1i64 << (info.bits_per_sample.max(1) - 1)) as f32;
    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| FingerprintError::decode(path, e))?;

    Ok(AudioData::new(samples, info.sample_rate, info.channels as u16))
}

/// Decode OGG Vorbis file
fn decode_ogg(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path)?;

    let mut reader = lewton::inside_ogg::OggStreamReader::new(file)
        .map_err(|e| FingerprintError::decode(path, e))?;

    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as u16;

    let mut samples = Vec::new();
    while let Some(packet) = reader
        .read_dec_packet_itl()
        .map_err(|e| FingerprintError::decode(path, e))?
    {
        samples.extend(packet.iter().map(|&s| s as f32 / 32768.0));
    }

    Ok(AudioData::new(samples, sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_to_mono_averages_channels() {
        let audio = AudioData::new(vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 4, 2);
        assert_eq!(audio.to_mono(), vec![0.5, 0.5, 0.0]);
        assert_eq!(audio.duration_ms, 750);
    }

    #[test]
    fn test_decode_wav_int16() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..8000 {
            let v = ((i as f32 * 0.05).sin() * 16000.0) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let audio = decode_audio(&path).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.samples.len(), 16000);
        assert_eq!(audio.duration_ms, 1000);
        assert!(audio.samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_decode_errors_are_typed() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.wav");
        assert!(matches!(decode_audio(&missing), Err(FingerprintError::NotFound(_))));

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hello").unwrap();
        assert!(matches!(
            decode_audio(&text),
            Err(FingerprintError::UnsupportedFormat(_))
        ));

        let broken = dir.path().join("broken.wav");
        std::fs::write(&broken, b"RIFF0000WAVEjunk").unwrap();
        assert!(matches!(
            decode_audio(&broken),
            Err(FingerprintError::Decode { .. })
        ));
    }
}
