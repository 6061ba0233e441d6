//! Snapshot reader
//!
//! Every check runs before anything is handed back: a snapshot either loads
//! completely or fails with an integrity / configuration error.

use crate::error::{Result, StoreError};
use crate::format::{
    SnapshotHeader, SnapshotPayload, CHECKSUM, END_MARKER, HEADER_SIZE, MAGIC, TRAILER_SIZE,
    VERSION,
};

pub struct SnapshotReader;

impl SnapshotReader {
    /// Validate and decode a snapshot image.
    ///
    /// `expected_config` is the fingerprint of the configuration the caller
    /// will hash queries with; a store built under any other configuration is
    /// rejected.
    pub fn decode(image: &[u8], expected_config: u64) -> Result<(SnapshotHeader, SnapshotPayload)> {
        let header = Self::read_header(image)?;
        let body = Self::verified_body(image, &header)?;

        if header.config_fingerprint != expected_config {
            return Err(StoreError::ConfigMismatch {
                expected: expected_config,
                found: header.config_fingerprint,
            });
        }

        let raw = if header.is_compressed() {
            zstd::decode_all(body)
                .map_err(|e| StoreError::integrity(format!("payload decompression failed: {e}")))?
        } else {
            body.to_vec()
        };

        let payload: SnapshotPayload = bincode::deserialize(&raw)
            .map_err(|e| StoreError::integrity(format!("payload decode failed: {e}")))?;

        if payload.tracks.len() as u64 != header.track_count {
            return Err(StoreError::integrity(format!(
                "header announces {} tracks, payload holds {}",
                header.track_count,
                payload.tracks.len()
            )));
        }
        if payload.buckets.len() as u64 != header.bucket_count {
            return Err(StoreError::integrity(format!(
                "header announces {} buckets, payload holds {}",
                header.bucket_count,
                payload.buckets.len()
            )));
        }
        let postings: u64 = payload.buckets.iter().map(|(_, b)| b.len() as u64).sum();
        if postings != header.posting_count {
            return Err(StoreError::integrity(format!(
                "header announces {} postings, payload holds {}",
                header.posting_count, postings
            )));
        }

        Ok((header, payload))
    }

    /// Read only the header, e.g. to report the configuration of a store
    pub fn read_header(image: &[u8]) -> Result<SnapshotHeader> {
        if image.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(StoreError::integrity(format!(
                "snapshot too short: {} bytes",
                image.len()
            )));
        }

        let mut bytes = [0u8; HEADER_SIZE];
        bytes.copy_from_slice(&image[..HEADER_SIZE]);
        let header = SnapshotHeader::from_bytes(&bytes);

        if header.magic != MAGIC {
            return Err(StoreError::integrity("magic bytes mismatch"));
        }
        if header.version != VERSION {
            return Err(StoreError::integrity(format!(
                "unsupported snapshot version {}",
                header.version
            )));
        }
        Ok(header)
    }

    fn verified_body<'a>(image: &'a [u8], header: &SnapshotHeader) -> Result<&'a [u8]> {
        let expected_len = (HEADER_SIZE as u64)
            .checked_add(header.payload_size)
            .and_then(|n| n.checked_add(TRAILER_SIZE as u64))
            .ok_or_else(|| StoreError::integrity("payload size overflow"))?;
        if image.len() as u64 != expected_len {
            return Err(StoreError::integrity(format!(
                "snapshot length {} does not match announced {}",
                image.len(),
                expected_len
            )));
        }

        let body_end = HEADER_SIZE + header.payload_size as usize;
        let trailer = &image[body_end..];
        if trailer[8..16] != END_MARKER {
            return Err(StoreError::integrity("missing end marker"));
        }

        let mut stored = [0u8; 8];
        stored.copy_from_slice(&trailer[..8]);
        let stored = u64::from_le_bytes(stored);
        let computed = CHECKSUM.checksum(&image[..body_end]);
        if stored != computed {
            return Err(StoreError::integrity(format!(
                "checksum mismatch: stored {stored:#018x}, computed {computed:#018x}"
            )));
        }

        Ok(&image[HEADER_SIZE..body_end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HashCode, Posting, Track, TrackId};
    use crate::writer::SnapshotWriter;
    use chrono::Utc;

    fn sample_payload() -> SnapshotPayload {
        SnapshotPayload {
            config_descriptor: "test".to_string(),
            next_track_id: 2,
            tracks: vec![Track {
                id: TrackId(1),
                source: "/music/a.wav".to_string(),
                title: "a".to_string(),
                duration_secs: 1.5,
                fingerprint_count: 2,
                indexed_at: Utc::now(),
            }],
            buckets: vec![
                (HashCode::new(0, 5), vec![Posting::new(TrackId(1), 0)]),
                (HashCode::new(0, 6), vec![Posting::new(TrackId(1), 1)]),
            ],
            silent: Vec::new(),
        }
    }

    fn encode(compress: bool) -> Vec<u8> {
        let payload = sample_payload();
        let header = SnapshotHeader::new(77, 1, 2, 2);
        SnapshotWriter::new()
            .compressed(compress)
            .encode(header, &payload)
            .unwrap()
    }

    #[test]
    fn test_decode_accepts_intact_snapshot() {
        for compress in [true, false] {
            let image = encode(compress);
            let (header, payload) = SnapshotReader::decode(&image, 77).unwrap();
            assert_eq!(header.is_compressed(), compress);
            assert_eq!(payload.tracks.len(), 1);
            assert_eq!(payload.buckets.len(), 2);
        }
    }

    #[test]
    fn test_truncated_snapshot_is_rejected() {
        let image = encode(true);
        let torn = &image[..image.len() - 5];
        assert!(matches!(
            SnapshotReader::decode(torn, 77),
            Err(StoreError::Integrity(_))
        ));
    }

    #[test]
    fn test_flipped_payload_byte_is_rejected() {
        let mut image = encode(false);
        image[HEADER_SIZE + 3] ^= 0xFF;
        assert!(matches!(
            SnapshotReader::decode(&image, 77),
            Err(StoreError::Integrity(_))
        ));
    }

    #[test]
    fn test_missing_end_marker_is_rejected() {
        let mut image = encode(false);
        let len = image.len();
        image[len - 1] = b'X';
        assert!(matches!(
            SnapshotReader::decode(&image, 77),
            Err(StoreError::Integrity(_))
        ));
    }

    #[test]
    fn test_config_mismatch_is_rejected() {
        let image = encode(true);
        match SnapshotReader::decode(&image, 78) {
            Err(StoreError::ConfigMismatch { expected, found }) => {
                assert_eq!(expected, 78);
                assert_eq!(found, 77);
            }
            other => panic!("expected config mismatch, got {other:?}"),
        }
    }
}
