//! JSON output formatting

use findsimilar_core::{FileOutcome, MatchResult, ScanReport, SkipReason};
use findsimilar_store::{StoreStats, Track};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct MatchOutput<'a> {
    query_path: &'a str,
    detections: usize,
    results: &'a [MatchResult],
}

#[derive(Serialize)]
struct ScanOutput<'a> {
    added: usize,
    skipped: BTreeMap<SkipReason, usize>,
    elapsed_seconds: f64,
    track_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<&'a [findsimilar_core::FileReport]>,
}

#[derive(Serialize)]
struct TracksOutput<'a> {
    count: usize,
    tracks: &'a [Track],
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    database: &'a str,
    config: &'a str,
    stats: StoreStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_snapshot: Option<&'a str>,
}

/// Ranked matches for one query
pub fn match_json(query_path: &str, results: &[MatchResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&MatchOutput {
        query_path,
        detections: results.len(),
        results,
    })
}

/// Scan summary; per-file outcomes only when `with_files` is set
pub fn scan_json(report: &ScanReport, track_count: usize, with_files: bool) -> serde_json::Result<String> {
    let mut skipped = BTreeMap::new();
    for file in &report.files {
        if let FileOutcome::Skipped(reason) = file.outcome {
            *skipped.entry(reason).or_insert(0) += 1;
        }
    }
    serde_json::to_string_pretty(&ScanOutput {
        added: report.added,
        skipped,
        elapsed_seconds: report.elapsed_secs,
        track_count,
        files: with_files.then_some(&report.files[..]),
    })
}

pub fn tracks_json(tracks: &[Track]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&TracksOutput {
        count: tracks.len(),
        tracks,
    })
}

pub fn info_json(
    database: &str,
    config: &str,
    stats: StoreStats,
    last_snapshot: Option<&str>,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&InfoOutput {
        database,
        config,
        stats,
        last_snapshot,
    })
}

/// Print a JSON document, reporting serialization failures on stderr
pub fn print_json(json: serde_json::Result<String>) {
    match json {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}
