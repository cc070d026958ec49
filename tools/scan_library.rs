use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use library::config::{config_path_from_env, load_or_create_config, resolve_path};
use library::{open_db, Indexer, ProgressReporter, ScanError, ScanOutcome};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod watch;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config_path_from_env);
    let (mut config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Wrote default config to {:?}", config_path);
    }
    if config.music_roots.is_empty() {
        return Err(format!("no music_roots configured in {:?}", config_path).into());
    }
    config.music_roots = config
        .music_roots
        .iter()
        .map(|root| resolve_path(&config_path, root).to_string_lossy().to_string())
        .collect();
    let roots: Vec<PathBuf> = config.music_roots.iter().map(PathBuf::from).collect();

    let index_path = resolve_path(&config_path, &config.index_path);
    info!("Using index {:?}", index_path);
    let db = open_db(&index_path)?;
    let watch_enabled = config.watch;
    let debounce = Duration::from_secs(config.watch_debounce_secs);
    let indexer = Arc::new(Indexer::new(config, db));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted; stopping");
                cancel.cancel();
            }
        });
    }

    match run_scan(&indexer, cancel.clone()).await {
        Ok(outcome) => print_summary(&outcome),
        Err(ScanError::Cancelled) => {
            println!("Scan cancelled");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    if watch_enabled {
        watch::watch_roots(indexer, roots, debounce, cancel).await?;
    }
    Ok(())
}

/// Runs one scan while logging progress from the watch channel.
pub(crate) async fn run_scan(
    indexer: &Indexer,
    cancel: CancellationToken,
) -> Result<ScanOutcome, ScanError> {
    let (reporter, mut rx) = ProgressReporter::channel();
    let logger = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let progress = *rx.borrow_and_update();
            info!(
                "Progress: {} explored, {} extracted",
                progress.explored, progress.extracted
            );
            tokio::time::sleep(PROGRESS_INTERVAL).await;
        }
    });
    let result = indexer.scan(cancel, reporter).await;
    logger.abort();
    result
}

pub(crate) fn print_summary(outcome: &ScanOutcome) {
    let stats = outcome.library.stats();
    let report = &outcome.report;
    println!(
        "Indexed: {} songs, {} albums, {} artists, {} genres, {} playlists",
        stats.songs, stats.albums, stats.artists, stats.genres, stats.playlists
    );
    println!(
        "Files: {} explored, {} cached, {} decoded, {} unreadable, {} rejected, \
         {} duplicates ({:.1}s)",
        report.explored,
        report.cache_hits,
        report.decoded,
        report.decode_failures,
        report.rejected,
        report.duplicates,
        report.elapsed.as_secs_f64()
    );
}
