//! findsimilar - index a music library and find similar tracks
//!
//! Usage:
//!   findsimilar scan <dir> [-d <secs>] [-j <threads>]
//!   findsimilar match <query_audio> [-t <votes>] [-n <results>]
//!   findsimilar search <text>
//!   findsimilar info

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use findsimilar_cli::output::{info_json, match_json, print_json, scan_json, tracks_json};
use findsimilar_core::{match_file, Scanner, Settings};
use findsimilar_store::{FileBackend, FingerprintStore, StoreManifest};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "findsimilar")]
#[command(about = "Content-based audio search", long_about = None)]
struct Args {
    /// Path to settings file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database directory (overrides the settings file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    silent: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fingerprint every audio file under a directory
    Scan {
        dir: PathBuf,

        /// Skip files longer than this many seconds
        #[arg(short = 'd', long = "skipduration")]
        skip_duration: Option<f64>,

        /// Worker threads (0 = all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Include per-file outcomes in the report
        #[arg(long)]
        files: bool,
    },
    /// Find tracks similar to an audio file
    Match {
        query: PathBuf,

        /// Minimum aligned votes
        #[arg(short = 't', long)]
        threshold: Option<usize>,

        /// Maximum number of results
        #[arg(short = 'n', long = "num")]
        num: Option<usize>,
    },
    /// Search indexed tracks by title or path
    Search { text: String },
    /// Show database statistics
    Info,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // JSON goes to stdout, logs to stderr
    let level = if args.silent {
        log::LevelFilter::Warn
    } else {
        match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(database) = args.database {
        settings.storage.database_dir = database;
    }

    match args.command {
        Command::Scan {
            dir,
            skip_duration,
            threads,
            files,
        } => {
            if let Some(secs) = skip_duration {
                settings.scan.skip_duration_above_secs = secs;
            }
            if let Some(threads) = threads {
                settings.scan.threads = threads;
            }
            run_scan(&settings, &dir, files)
        }
        Command::Match {
            query,
            threshold,
            num,
        } => {
            if let Some(threshold) = threshold {
                settings.matching.threshold_votes = threshold;
            }
            if let Some(num) = num {
                settings.matching.max_results = num;
            }
            run_match(&settings, &query)
        }
        Command::Search { text } => run_search(&settings, &text),
        Command::Info => run_info(&settings),
    }
}

fn open_store(settings: &Settings) -> Result<(FileBackend, FingerprintStore)> {
    settings.validate()?;
    let backend = FileBackend::new(&settings.storage.database_dir);
    let store = FingerprintStore::open(&backend, settings.store_config()).with_context(|| {
        format!(
            "Failed to open database {}",
            settings.storage.database_dir.display()
        )
    })?;
    log::info!(
        "Opened database {} ({} tracks)",
        settings.storage.database_dir.display(),
        store.track_count()
    );
    Ok((backend, store))
}

fn run_scan(settings: &Settings, dir: &Path, with_files: bool) -> Result<()> {
    let (backend, store) = open_store(settings)?;

    let scanner = Scanner::new(&store, &settings.fingerprint, settings.scan.clone())?;
    let report = scanner.scan_directory(dir)?;

    if report.added > 0 {
        let stats = store
            .snapshot(&backend)
            .context("Failed to write database snapshot")?;
        log::info!(
            "Snapshot written: {} tracks, {} postings",
            stats.tracks,
            stats.postings
        );
    }

    print_json(scan_json(&report, store.track_count(), with_files));
    Ok(())
}

fn run_match(settings: &Settings, query: &Path) -> Result<()> {
    if !query.exists() {
        anyhow::bail!("Query file not found: {}", query.display());
    }
    let (_, store) = open_store(settings)?;

    let start = std::time::Instant::now();
    let results = match_file(&store, query, &settings.fingerprint, &settings.matching)?;
    log::info!(
        "Matching completed in {:.2}s, found {} results",
        start.elapsed().as_secs_f64(),
        results.len()
    );

    print_json(match_json(&query.display().to_string(), &results));
    Ok(())
}

fn run_search(settings: &Settings, text: &str) -> Result<()> {
    let (_, store) = open_store(settings)?;
    print_json(tracks_json(&store.search_tracks(text)));
    Ok(())
}

fn run_info(settings: &Settings) -> Result<()> {
    let (backend, store) = open_store(settings)?;
    let manifest = StoreManifest::load(&backend)?;
    print_json(info_json(
        &settings.storage.database_dir.display().to_string(),
        &store.config().config_descriptor,
        store.stats(),
        manifest.as_ref().map(|m| m.written_at.as_str()),
    ));
    Ok(())
}
