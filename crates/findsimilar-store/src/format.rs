//! Snapshot file format structures
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! header   48 bytes   see SnapshotHeader
//! payload  n bytes    bincode(SnapshotPayload), zstd-compressed if flagged
//! trailer  16 bytes   CRC-64 of header+payload, END_MARKER
//! ```

use crate::model::{HashCode, Posting, Track, TrackId};
use crc::{Crc, CRC_64_ECMA_182};
use serde::{Deserialize, Serialize};

/// Magic bytes for snapshot files: "FSDB"
pub const MAGIC: [u8; 4] = [0x46, 0x53, 0x44, 0x42];

/// Current format version
pub const VERSION: u16 = 1;

/// Trailing marker; absent on a torn write
pub const END_MARKER: [u8; 8] = *b"FSDBEND\0";

/// Checksum over header and payload
pub const CHECKSUM: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

pub const HEADER_SIZE: usize = 48;
pub const TRAILER_SIZE: usize = 16;

const FLAG_COMPRESSED: u16 = 0x1;

/// Fixed-size snapshot header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u16,
    /// Flags (bit 0: compressed)
    pub flags: u16,
    /// Fingerprint of the hashing configuration the store was built with
    pub config_fingerprint: u64,
    pub track_count: u64,
    pub bucket_count: u64,
    pub posting_count: u64,
    /// Size of the payload as stored (after compression)
    pub payload_size: u64,
}

impl SnapshotHeader {
    pub fn new(
        config_fingerprint: u64,
        track_count: u64,
        bucket_count: u64,
        posting_count: u64,
    ) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            config_fingerprint,
            track_count,
            bucket_count,
            posting_count,
            payload_size: 0,
        }
    }

    pub fn is_compressed(&self) -> bool {
        (self.flags & FLAG_COMPRESSED) != 0
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        if compressed {
            self.flags |= FLAG_COMPRESSED;
        } else {
            self.flags &= !FLAG_COMPRESSED;
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic);
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.flags.to_le_bytes());
        out[8..16].copy_from_slice(&self.config_fingerprint.to_le_bytes());
        out[16..24].copy_from_slice(&self.track_count.to_le_bytes());
        out[24..32].copy_from_slice(&self.bucket_count.to_le_bytes());
        out[32..40].copy_from_slice(&self.posting_count.to_le_bytes());
        out[40..48].copy_from_slice(&self.payload_size.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u64_at = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(buf)
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);

        Self {
            magic,
            version: u16_at(4),
            flags: u16_at(6),
            config_fingerprint: u64_at(8),
            track_count: u64_at(16),
            bucket_count: u64_at(24),
            posting_count: u64_at(32),
            payload_size: u64_at(40),
        }
    }
}

/// Serialized body of a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPayload {
    /// Human-readable description of the configuration, for diagnostics
    pub config_descriptor: String,
    pub next_track_id: u32,
    pub tracks: Vec<Track>,
    pub buckets: Vec<(HashCode, Vec<Posting>)>,
    /// Positions of silent sub-fingerprints per track; these have no postings
    pub silent: Vec<(TrackId, Vec<u32>)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut header = SnapshotHeader::new(0xDEAD_BEEF, 3, 10, 42);
        header.payload_size = 1234;
        header.set_compressed(true);

        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"FSDB");
        assert_eq!(SnapshotHeader::from_bytes(&bytes), header);
        assert!(header.is_compressed());

        header.set_compressed(false);
        assert!(!header.is_compressed());
    }
}
