//! Sharded inverted index: hash code -> ordered set of postings
//!
//! Buckets are spread over a fixed number of shards, each behind its own
//! `RwLock`. Writers only lock the shard holding the bucket they touch, so
//! lookups of unrelated codes proceed while a scan is inserting.

use crate::model::{HashCode, Posting, TrackId};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const DEFAULT_SHARDS: usize = 64;

type Bucket = Vec<Posting>;
type Shard = HashMap<HashCode, Bucket>;

pub struct InvertedIndex {
    shards: Vec<RwLock<Shard>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard_of(&self, code: &HashCode) -> usize {
        // Fibonacci mix so consecutive values from one table spread out
        let mixed = (code.value as u64 ^ ((code.table as u64) << 32))
            .wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (mixed >> 32) as usize % self.shards.len()
    }

    fn read(&self, shard: usize) -> RwLockReadGuard<'_, Shard> {
        self.shards[shard]
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, shard: usize) -> RwLockWriteGuard<'_, Shard> {
        self.shards[shard]
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a posting, keeping the bucket sorted and duplicate-free.
    /// Returns false if the posting was already present.
    pub fn insert(&self, code: HashCode, posting: Posting) -> bool {
        let mut shard = self.write(self.shard_of(&code));
        let bucket = shard.entry(code).or_default();
        insert_sorted(bucket, posting)
    }

    /// Remove every posting of `track` under `code`
    pub fn remove(&self, code: HashCode, track: TrackId) {
        let mut shard = self.write(self.shard_of(&code));
        if let Some(bucket) = shard.get_mut(&code) {
            bucket.retain(|p| p.track != track);
            if bucket.is_empty() {
                shard.remove(&code);
            }
        }
    }

    pub fn lookup(&self, code: HashCode) -> Vec<Posting> {
        self.read(self.shard_of(&code))
            .get(&code)
            .cloned()
            .unwrap_or_default()
    }

    /// Batched lookup; each shard lock is taken once per call.
    /// The result is aligned with `codes`.
    pub fn lookup_many(&self, codes: &[HashCode]) -> Vec<Vec<Posting>> {
        let mut by_shard: Vec<Vec<usize>> = vec![Vec::new(); self.shards.len()];
        for (i, code) in codes.iter().enumerate() {
            by_shard[self.shard_of(code)].push(i);
        }

        let mut results = vec![Vec::new(); codes.len()];
        for (shard_idx, members) in by_shard.iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let shard = self.read(shard_idx);
            for &i in members {
                if let Some(bucket) = shard.get(&codes[i]) {
                    results[i] = bucket.clone();
                }
            }
        }
        results
    }

    pub fn bucket_count(&self) -> usize {
        (0..self.shards.len()).map(|s| self.read(s).len()).sum()
    }

    pub fn posting_count(&self) -> u64 {
        (0..self.shards.len())
            .map(|s| self.read(s).values().map(|b| b.len() as u64).sum::<u64>())
            .sum()
    }

    /// Copy out all buckets ordered by code
    pub fn export(&self) -> Vec<(HashCode, Vec<Posting>)> {
        let mut buckets: Vec<(HashCode, Vec<Posting>)> = (0..self.shards.len())
            .flat_map(|s| {
                self.read(s)
                    .iter()
                    .map(|(code, bucket)| (*code, bucket.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        buckets.sort_by_key(|(code, _)| *code);
        buckets
    }

    /// Rebuild from exported buckets. Returns the number of postings dropped
    /// because they were duplicates or out of order.
    pub fn import(&self, buckets: Vec<(HashCode, Vec<Posting>)>) -> usize {
        let mut rejected = 0;
        for (code, mut postings) in buckets {
            let before = postings.len();
            postings.sort();
            postings.dedup();
            rejected += before - postings.len();
            let mut shard = self.write(self.shard_of(&code));
            let bucket = shard.entry(code).or_default();
            if bucket.is_empty() {
                *bucket = postings;
            } else {
                for p in postings {
                    if !insert_sorted(bucket, p) {
                        rejected += 1;
                    }
                }
            }
        }
        rejected
    }
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_sorted(bucket: &mut Bucket, posting: Posting) -> bool {
    // Postings of one track usually arrive in position order, so appending is
    // the common case.
    match bucket.last() {
        None => {
            bucket.push(posting);
            true
        }
        Some(last) if *last < posting => {
            bucket.push(posting);
            true
        }
        _ => match bucket.binary_search(&posting) {
            Ok(_) => false,
            Err(at) => {
                bucket.insert(at, posting);
                true
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(track: u32, position: u32) -> Posting {
        Posting::new(TrackId(track), position)
    }

    #[test]
    fn test_bucket_stays_sorted_and_unique() {
        let index = InvertedIndex::with_shards(4);
        let code = HashCode::new(0, 42);

        assert!(index.insert(code, p(2, 5)));
        assert!(index.insert(code, p(1, 9)));
        assert!(index.insert(code, p(2, 1)));
        assert!(!index.insert(code, p(1, 9)));

        assert_eq!(index.lookup(code), vec![p(1, 9), p(2, 1), p(2, 5)]);
        assert_eq!(index.posting_count(), 3);
    }

    #[test]
    fn test_tables_do_not_share_buckets() {
        let index = InvertedIndex::new();
        index.insert(HashCode::new(0, 7), p(1, 0));
        index.insert(HashCode::new(1, 7), p(2, 0));

        assert_eq!(index.lookup(HashCode::new(0, 7)), vec![p(1, 0)]);
        assert_eq!(index.lookup(HashCode::new(1, 7)), vec![p(2, 0)]);
        assert_eq!(index.bucket_count(), 2);
    }

    #[test]
    fn test_lookup_many_is_aligned_with_input() {
        let index = InvertedIndex::with_shards(3);
        for v in 0..20u32 {
            index.insert(HashCode::new(0, v), p(1, v));
        }
        let codes: Vec<HashCode> = [19u32, 100, 3]
            .iter()
            .map(|&v| HashCode::new(0, v))
            .collect();
        let results = index.lookup_many(&codes);
        assert_eq!(results[0], vec![p(1, 19)]);
        assert!(results[1].is_empty());
        assert_eq!(results[2], vec![p(1, 3)]);
    }

    #[test]
    fn test_remove_drops_empty_buckets() {
        let index = InvertedIndex::new();
        let code = HashCode::new(2, 1);
        index.insert(code, p(1, 0));
        index.insert(code, p(1, 3));
        index.remove(code, TrackId(1));
        assert!(index.lookup(code).is_empty());
        assert_eq!(index.bucket_count(), 0);
    }

    #[test]
    fn test_export_import_preserves_buckets() {
        let index = InvertedIndex::new();
        index.insert(HashCode::new(0, 1), p(1, 0));
        index.insert(HashCode::new(0, 1), p(2, 4));
        index.insert(HashCode::new(1, 9), p(1, 0));

        let exported = index.export();
        let rebuilt = InvertedIndex::with_shards(8);
        assert_eq!(rebuilt.import(exported.clone()), 0);
        assert_eq!(rebuilt.export(), exported);
    }
}
