use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redb::Database;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::Cache;
use crate::config::IndexerConfig;
use crate::explore::explore;
use crate::extract::{spawn_extract, LoftyDecoder, TagDecoder};
use crate::graph::evaluate;
use crate::interpret::interpret;
use crate::playlist::{import_playlist_files, merge_definitions, PlaylistStore};
use crate::snapshot::Library;
use crate::{LibraryError, ScanError};

/// Counters that only ever go up during one scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub explored: usize,
    pub extracted: usize,
}

/// Publishes progress without ever waiting on observers.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sender: Option<Arc<watch::Sender<ScanProgress>>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, watch::Receiver<ScanProgress>) {
        let (tx, rx) = watch::channel(ScanProgress::default());
        (
            Self {
                sender: Some(Arc::new(tx)),
            },
            rx,
        )
    }

    pub(crate) fn explored(&self) {
        if let Some(sender) = &self.sender {
            sender.send_modify(|progress| progress.explored += 1);
        }
    }

    pub(crate) fn extracted(&self) {
        if let Some(sender) = &self.sender {
            sender.send_modify(|progress| progress.extracted += 1);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub explored: usize,
    pub cache_hits: usize,
    pub decoded: usize,
    pub decode_failures: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub playlists: usize,
    pub pruned_cache: bool,
    pub elapsed: Duration,
}

pub struct ScanOutcome {
    pub library: Library,
    pub report: ScanReport,
}

/// Runs full scans of the configured music roots.
pub struct Indexer {
    config: IndexerConfig,
    db: Arc<Database>,
    decoder: Arc<dyn TagDecoder>,
}

impl Indexer {
    pub fn new(config: IndexerConfig, db: Arc<Database>) -> Self {
        Self {
            config,
            db,
            decoder: Arc::new(LoftyDecoder),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn TagDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Explores, extracts, interprets and links the whole library.
    ///
    /// Per-file failures are counted in the report. A cancelled scan
    /// returns `ScanError::Cancelled` and leaves the tag cache unpruned.
    pub async fn scan(
        &self,
        cancel: CancellationToken,
        progress: ProgressReporter,
    ) -> Result<ScanOutcome, ScanError> {
        let started = Instant::now();
        let config = &self.config;
        let settings = config.interpret_settings();
        let roots: Vec<PathBuf> = config.music_roots.iter().map(PathBuf::from).collect();
        info!("Scanning {:?}", roots);

        let cache = {
            let db = Arc::clone(&self.db);
            let mode = config.cache_mode;
            tokio::task::spawn_blocking(move || Cache::open(mode, db)).await?
        };

        let (file_tx, file_rx) = mpsc::channel(config.channel_capacity.max(1));
        let explorer = tokio::spawn(explore(
            roots,
            config.explore_concurrency,
            file_tx,
            progress.clone(),
            cancel.clone(),
        ));
        let (mut extracted_rx, extract) = spawn_extract(
            file_rx,
            cache.clone(),
            Arc::clone(&self.decoder),
            config.extract_workers,
            config.channel_capacity,
            cancel.clone(),
        );

        let mut pre_songs = Vec::new();
        let mut seen_keys = HashSet::new();
        let mut rejected = 0;
        loop {
            let extracted = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = extracted_rx.recv() => match next {
                    Some(extracted) => extracted,
                    None => break,
                },
            };
            progress.extracted();
            seen_keys.insert(extracted.file.cache_key());
            match interpret(&extracted.file, &extracted.tags, &settings) {
                Ok(song) => pre_songs.push(song),
                Err(err) => {
                    rejected += 1;
                    debug!("Rejected {:?}: {}", extracted.file.path, err);
                }
            }
        }
        drop(extracted_rx);

        let explored = explorer.await??;
        let stats = extract.finish().await?;
        if cancel.is_cancelled() {
            info!("Scan cancelled after {} files", seen_keys.len());
            return Err(ScanError::Cancelled);
        }

        let evaluation = tokio::task::spawn_blocking(move || evaluate(pre_songs)).await?;

        let complete = explored.inaccessible_roots.is_empty() && explored.skipped_directories == 0;
        let pruned_cache = config.prune_cache && complete;
        if pruned_cache {
            let cache = cache.clone();
            tokio::task::spawn_blocking(move || cache.cleanup(&seen_keys)).await?;
        } else if config.prune_cache {
            info!("Skipping tag cache cleanup; part of the library was unreadable");
        }

        let db = Arc::clone(&self.db);
        let naming = settings.naming;
        let playlist_paths = explored.playlists;
        let graph = evaluation.graph;
        let library = tokio::task::spawn_blocking(move || {
            let imported = import_playlist_files(&playlist_paths);
            let store = PlaylistStore::new(db);
            let stored = store.list()?;
            let definitions = merge_definitions(imported, stored);
            Ok::<Library, LibraryError>(Library::new(graph, definitions, Some(store), naming))
        })
        .await??;

        let report = ScanReport {
            explored: stats.cache_hits + stats.decoded + stats.failed,
            cache_hits: stats.cache_hits,
            decoded: stats.decoded,
            decode_failures: stats.failed,
            rejected,
            duplicates: evaluation.duplicates,
            playlists: library.playlists().len(),
            pruned_cache,
            elapsed: started.elapsed(),
        };
        let library_stats = library.stats();
        info!(
            "Scan complete: {} songs, {} albums, {} artists, {} genres, {} playlists in {:.1}s",
            library_stats.songs,
            library_stats.albums,
            library_stats.artists,
            library_stats.genres,
            library_stats.playlists,
            report.elapsed.as_secs_f64()
        );
        Ok(ScanOutcome { library, report })
    }
}

#[cfg(test)]
mod tests {
    use super::{ProgressReporter, ScanProgress};

    #[test]
    fn progress_counts_up_without_receivers() {
        let (reporter, rx) = ProgressReporter::channel();
        reporter.explored();
        reporter.explored();
        reporter.extracted();
        assert_eq!(
            *rx.borrow(),
            ScanProgress {
                explored: 2,
                extracted: 1
            }
        );
        drop(rx);
        reporter.extracted();
        ProgressReporter::default().explored();
    }
}
