use std::sync::Arc;

use common::DeviceFile;
use metadata::{read_raw_tags, MetadataError, RawTags};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheResult};
use crate::ScanError;

/// Reads raw tags from one file. Implementations block.
pub trait TagDecoder: Send + Sync {
    fn decode(&self, file: &DeviceFile) -> Result<RawTags, MetadataError>;
}

pub struct LoftyDecoder;

impl TagDecoder for LoftyDecoder {
    fn decode(&self, file: &DeviceFile) -> Result<RawTags, MetadataError> {
        read_raw_tags(&file.path)
    }
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub file: DeviceFile,
    pub tags: RawTags,
    pub cached: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractStats {
    pub cache_hits: usize,
    pub decoded: usize,
    pub failed: usize,
}

impl ExtractStats {
    fn merge(&mut self, other: ExtractStats) {
        self.cache_hits += other.cache_hits;
        self.decoded += other.decoded;
        self.failed += other.failed;
    }
}

/// Join handles for the cache stage and the decode workers.
pub struct ExtractHandle {
    tasks: Vec<JoinHandle<ExtractStats>>,
}

impl ExtractHandle {
    pub async fn finish(self) -> Result<ExtractStats, ScanError> {
        let mut stats = ExtractStats::default();
        for task in self.tasks {
            stats.merge(task.await?);
        }
        Ok(stats)
    }
}

/// Starts the extract stage.
///
/// Cache hits are forwarded straight to the returned receiver. Misses go
/// through one shared queue to `workers` blocking decode threads, which
/// write each result back to the cache before forwarding it.
pub fn spawn_extract(
    input: Receiver<DeviceFile>,
    cache: Cache,
    decoder: Arc<dyn TagDecoder>,
    workers: usize,
    capacity: usize,
    cancel: CancellationToken,
) -> (Receiver<Extracted>, ExtractHandle) {
    let capacity = capacity.max(1);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (miss_tx, miss_rx) = mpsc::channel(capacity);
    let queue = Arc::new(Mutex::new(miss_rx));

    let mut tasks = Vec::with_capacity(workers + 1);
    {
        let cache = cache.clone();
        let out_tx = out_tx.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            cache_stage(input, cache, out_tx, miss_tx, cancel)
        }));
    }

    for id in 0..workers.max(1) {
        let queue = Arc::clone(&queue);
        let decoder = Arc::clone(&decoder);
        let cache = cache.clone();
        let out_tx = out_tx.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            decode_worker(id, queue, decoder, cache, out_tx, cancel)
        }));
    }

    (out_rx, ExtractHandle { tasks })
}

fn cache_stage(
    mut input: Receiver<DeviceFile>,
    cache: Cache,
    hits: Sender<Extracted>,
    misses: Sender<DeviceFile>,
    cancel: CancellationToken,
) -> ExtractStats {
    let mut stats = ExtractStats::default();
    while let Some(file) = input.blocking_recv() {
        if cancel.is_cancelled() {
            break;
        }
        match cache.read(file) {
            CacheResult::Hit(file, tags) => {
                stats.cache_hits += 1;
                let extracted = Extracted {
                    file,
                    tags,
                    cached: true,
                };
                if hits.blocking_send(extracted).is_err() {
                    break;
                }
            }
            CacheResult::Miss(file) => {
                if misses.blocking_send(file).is_err() {
                    break;
                }
            }
        }
    }
    stats
}

fn decode_worker(
    id: usize,
    queue: Arc<Mutex<Receiver<DeviceFile>>>,
    decoder: Arc<dyn TagDecoder>,
    cache: Cache,
    out: Sender<Extracted>,
    cancel: CancellationToken,
) -> ExtractStats {
    let mut stats = ExtractStats::default();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let next = queue.lock().blocking_recv();
        let file = match next {
            Some(file) => file,
            None => break,
        };
        if cancel.is_cancelled() {
            break;
        }
        match decoder.decode(&file) {
            Ok(tags) => {
                stats.decoded += 1;
                cache.write(&file, &tags);
                let extracted = Extracted {
                    file,
                    tags,
                    cached: false,
                };
                if out.blocking_send(extracted).is_err() {
                    break;
                }
            }
            Err(err) => {
                stats.failed += 1;
                warn!("Failed to read tags from {:?}: {}", file.path, err);
            }
        }
    }
    debug!(
        "Extract worker {} done: {} decoded, {} failed",
        id, stats.decoded, stats.failed
    );
    stats
}
