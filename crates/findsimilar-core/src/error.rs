//! Fingerprinting errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Malformed or undecodable audio
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Empty sample sequence handed to the spectrogram builder
    #[error("empty sample sequence")]
    EmptyInput,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FingerprintError {
    pub(crate) fn decode(path: &std::path::Path, reason: impl ToString) -> Self {
        FingerprintError::Decode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FingerprintError>;
