//! Data model shared by the store, the hasher and the matcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an indexed track
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied description of a track about to be inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    /// Identity used for duplicate detection (canonical source path)
    pub source: String,
    /// Human-facing reference, e.g. title or ISRC
    pub title: String,
    /// Duration of the decoded audio in seconds
    pub duration_secs: f64,
}

impl TrackMeta {
    pub fn new(source: impl Into<String>, title: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            duration_secs,
        }
    }
}

/// One indexed audio item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub source: String,
    pub title: String,
    pub duration_secs: f64,
    /// Number of sub-fingerprints in the track's record
    pub fingerprint_count: u32,
    pub indexed_at: DateTime<Utc>,
}

/// Codes derived from one block of spectral frames
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubFingerprint {
    /// Frame index of the block start
    pub position: u32,
    /// One code per hash table; code `i` is looked up in table `i`
    pub codes: Vec<u32>,
    /// Block without any spectral change (digital silence, steady tone).
    /// Its codes are all zero; it is neither indexed nor voted on.
    pub silent: bool,
}

impl SubFingerprint {
    pub fn new(position: u32, codes: Vec<u32>) -> Self {
        Self {
            position,
            codes,
            silent: false,
        }
    }

    /// A silent block carrying `tables` zero codes
    pub fn silent(position: u32, tables: usize) -> Self {
        Self {
            position,
            codes: vec![0; tables],
            silent: true,
        }
    }

    /// Inverted-index keys of this sub-fingerprint; none when silent
    pub fn hash_codes(&self) -> impl Iterator<Item = HashCode> + '_ {
        let keyed = if self.silent { 0 } else { self.codes.len() };
        self.codes
            .iter()
            .take(keyed)
            .enumerate()
            .map(|(table, &value)| HashCode::new(table as u16, value))
    }
}

/// Key of the inverted index: the code value within its hash table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HashCode {
    pub table: u16,
    pub value: u32,
}

impl HashCode {
    pub fn new(table: u16, value: u32) -> Self {
        Self { table, value }
    }
}

/// One occurrence of a hash code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Posting {
    pub track: TrackId,
    pub position: u32,
}

impl Posting {
    pub fn new(track: TrackId, position: u32) -> Self {
        Self { track, position }
    }
}

/// Aggregate counters over the store contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub tracks: usize,
    pub sub_fingerprints: u64,
    pub buckets: usize,
    pub postings: u64,
}
