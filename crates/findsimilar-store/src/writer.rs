//! Snapshot writer

use crate::error::Result;
use crate::format::{SnapshotHeader, SnapshotPayload, CHECKSUM, END_MARKER, HEADER_SIZE, TRAILER_SIZE};

const ZSTD_LEVEL: i32 = 3;

pub struct SnapshotWriter {
    compress: bool,
}

impl SnapshotWriter {
    pub fn new() -> Self {
        Self { compress: true }
    }

    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Encode a complete snapshot image: header, payload, checksum, end marker
    pub fn encode(&self, mut header: SnapshotHeader, payload: &SnapshotPayload) -> Result<Vec<u8>> {
        let raw = bincode::serialize(payload)?;
        let body = if self.compress {
            zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)?
        } else {
            raw
        };

        header.set_compressed(self.compress);
        header.payload_size = body.len() as u64;

        let mut image = Vec::with_capacity(HEADER_SIZE + body.len() + TRAILER_SIZE);
        image.extend_from_slice(&header.to_bytes());
        image.extend_from_slice(&body);

        let checksum = CHECKSUM.checksum(&image);
        image.extend_from_slice(&checksum.to_le_bytes());
        image.extend_from_slice(&END_MARKER);

        log::debug!(
            "Encoded snapshot: {} tracks, {} buckets, {} bytes payload{}",
            header.track_count,
            header.bucket_count,
            header.payload_size,
            if self.compress { " (zstd)" } else { "" }
        );

        Ok(image)
    }
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self::new()
    }
}
