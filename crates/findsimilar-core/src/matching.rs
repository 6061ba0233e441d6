//! Matching algorithm and query results
//!
//! Every code of every query sub-fingerprint is looked up in the store. Each
//! hit votes for a `(track, offset)` bin, where the offset is the stored
//! position minus the query position. The fullest bin of a track decides
//! whether it is reported and how it is scored. Silent sub-fingerprints have
//! no index keys and never vote.

use crate::config::{FingerprintConfig, MatchConfig};
use findsimilar_store::{FingerprintStore, HashCode, SubFingerprint, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

mod scoring;

pub use scoring::{CollisionModel, CoverageEstimator, CoverageInput};

/// One ranked answer to a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub track_id: TrackId,
    /// Source identity of the matched track
    pub source: String,
    pub title: String,
    /// Votes in the winning offset bin
    pub votes: usize,
    /// Stored position minus query position, in sub-fingerprints
    pub offset: i64,
    pub confidence: f64,
    pub coverage: f64,
    pub estimated_coverage: f64,

    /// Aligned region in the query (seconds)
    pub query_start: f64,
    pub query_stop: f64,
    /// Aligned region in the matched track (seconds)
    pub track_start: f64,
    pub track_stop: f64,
}

/// One query hit on a candidate track
#[derive(Debug, Clone, Copy)]
struct Hit {
    offset: i64,
    stored: u32,
}

/// Contiguous aligned stretch of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AlignedRun {
    first: u32,
    last: u32,
}

impl AlignedRun {
    fn span(&self) -> u32 {
        self.last - self.first + 1
    }
}

/// Matcher over a fingerprint store
pub struct Matcher<'a> {
    store: &'a FingerprintStore,
    config: MatchConfig,
    frame_duration: f64,
    /// Positions closer than this share frames and collide together
    block_frames: u32,
    estimator: Box<dyn CoverageEstimator>,
}

impl<'a> Matcher<'a> {
    pub fn new(store: &'a FingerprintStore, fingerprint: &FingerprintConfig, config: MatchConfig) -> Self {
        Self {
            store,
            config,
            frame_duration: fingerprint.frame_duration_secs(),
            block_frames: fingerprint.block_frames.max(1) as u32,
            estimator: Box::new(CollisionModel::new(fingerprint)),
        }
    }

    /// Replace the estimated coverage model
    pub fn with_estimator(mut self, estimator: Box<dyn CoverageEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Query with the configured threshold and result limit
    pub fn query(&self, query: &[SubFingerprint]) -> Vec<MatchResult> {
        self.find_matches(query, self.config.threshold_votes, self.config.max_results)
    }

    /// Rank stored tracks against the query sub-fingerprints
    ///
    /// Only tracks committed before the call are considered. Tracks whose best
    /// offset bin holds fewer than `threshold_votes` votes are dropped.
    pub fn find_matches(
        &self,
        query: &[SubFingerprint],
        threshold_votes: usize,
        max_results: usize,
    ) -> Vec<MatchResult> {
        let informative = query.iter().filter(|fp| !fp.silent).count();
        if informative == 0 || max_results == 0 {
            return Vec::new();
        }

        let view = self.store.read_view();

        let mut codes: Vec<HashCode> = Vec::new();
        let mut spans = Vec::with_capacity(query.len());
        for fp in query {
            let start = codes.len();
            codes.extend(fp.hash_codes());
            spans.push(start..codes.len());
        }
        let postings = view.lookup_many(&codes);

        let candidates: HashSet<TrackId> = postings.iter().flatten().map(|p| p.track).collect();
        let visible = view.visible_tracks(candidates);
        if visible.is_empty() {
            return Vec::new();
        }

        // One vote per query sub-fingerprint per (track, offset)
        let mut hits: HashMap<TrackId, Vec<Hit>> = HashMap::new();
        let mut query_hits = 0usize;
        let mut seen: HashSet<(TrackId, i64)> = HashSet::new();
        for (fp, span) in query.iter().zip(spans) {
            seen.clear();
            for posting in postings[span].iter().flatten() {
                if !visible.contains_key(&posting.track) {
                    continue;
                }
                let offset = posting.position as i64 - fp.position as i64;
                if seen.insert((posting.track, offset)) {
                    hits.entry(posting.track).or_default().push(Hit {
                        offset,
                        stored: posting.position,
                    });
                }
            }
            if !seen.is_empty() {
                query_hits += 1;
            }
        }

        log::debug!(
            "{} query sub-fingerprints ({} silent), {} with hits, {} candidate tracks",
            query.len(),
            query.len() - informative,
            query_hits,
            hits.len()
        );

        let corpus_size = view.corpus_size();
        let mut results = Vec::new();

        for (track_id, track_hits) in hits {
            let Some((offset, votes)) = best_offset(&track_hits) else {
                continue;
            };
            if votes < threshold_votes {
                log::trace!(
                    "Skipping track {}: best offset {} has {} votes (need {})",
                    track_id,
                    offset,
                    votes,
                    threshold_votes
                );
                continue;
            }
            let Some(track) = visible.get(&track_id) else {
                continue;
            };

            let mut aligned: Vec<u32> = track_hits
                .iter()
                .filter(|h| h.offset == offset)
                .map(|h| h.stored)
                .collect();
            aligned.sort_unstable();
            let Some(run) = longest_run(&aligned, self.config.max_gap_frames) else {
                continue;
            };

            let coverage = if track.fingerprint_count == 0 {
                0.0
            } else {
                (run.span() as f64 / track.fingerprint_count as f64).min(1.0)
            };
            let confidence = votes as f64 / query_hits.max(1) as f64;
            let estimated_coverage = self.estimator.estimate(&CoverageInput {
                coverage,
                votes,
                distinct_votes: distinct_votes(&aligned, self.block_frames),
                query_hits,
                query_len: informative,
                corpus_size,
            });

            let query_first = run.first as i64 - offset;
            let query_last = run.last as i64 - offset;
            log::debug!(
                "Track {}: votes {}, offset {}, aligned run {}..={}",
                track_id,
                votes,
                offset,
                run.first,
                run.last
            );

            results.push(MatchResult {
                track_id,
                source: track.source.clone(),
                title: track.title.clone(),
                votes,
                offset,
                confidence,
                coverage,
                estimated_coverage,
                query_start: query_first as f64 * self.frame_duration,
                query_stop: (query_last + 1) as f64 * self.frame_duration,
                track_start: run.first as f64 * self.frame_duration,
                track_stop: (run.last + 1) as f64 * self.frame_duration,
            });
        }

        rank(&mut results);
        results.truncate(max_results);
        results
    }
}

/// Offset bin with the most votes; ties go to the smallest offset
fn best_offset(hits: &[Hit]) -> Option<(i64, usize)> {
    let mut histogram: HashMap<i64, usize> = HashMap::new();
    for hit in hits {
        *histogram.entry(hit.offset).or_insert(0) += 1;
    }
    histogram
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
}

/// Longest stretch of sorted positions whose gaps stay within `max_gap`
fn longest_run(sorted: &[u32], max_gap: u32) -> Option<AlignedRun> {
    let (&first, rest) = sorted.split_first()?;
    let mut best = AlignedRun { first, last: first };
    let mut current = best;

    for &pos in rest {
        if pos - current.last > max_gap {
            current = AlignedRun { first: pos, last: pos };
        } else {
            current.last = pos;
        }
        if current.span() > best.span() {
            best = current;
        }
    }
    Some(best)
}

/// Aligned positions at least `spacing` apart, counted greedily from the first
fn distinct_votes(sorted: &[u32], spacing: u32) -> usize {
    let mut count = 0;
    let mut last: Option<u32> = None;
    for &pos in sorted {
        if last.map_or(true, |l| pos - l >= spacing) {
            count += 1;
            last = Some(pos);
        }
    }
    count
}

/// Confidence desc, coverage desc, then track id asc
fn rank(results: &mut [MatchResult]) {
    results.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(b.coverage.total_cmp(&a.coverage))
            .then(a.track_id.cmp(&b.track_id))
    });
}
