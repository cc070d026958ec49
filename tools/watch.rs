use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use library::{Indexer, ScanError};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{print_summary, run_scan};

/// Rescans whenever the roots change, once `debounce` passes without events.
pub async fn watch_roots(
    indexer: Arc<Indexer>,
    roots: Vec<PathBuf>,
    debounce: Duration,
    cancel: CancellationToken,
) -> Result<(), notify::Error> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        NotifyConfig::default(),
    )?;

    for root in &roots {
        if let Err(err) = watcher.watch(root, RecursiveMode::Recursive) {
            warn!("Failed to watch {:?}: {}", root, err);
        }
    }
    info!(
        "Watching {:?} for changes (debounce {}s)",
        roots,
        debounce.as_secs()
    );

    watch_loop(&indexer, rx, debounce, cancel).await;
    drop(watcher);
    Ok(())
}

async fn watch_loop(
    indexer: &Indexer,
    mut rx: UnboundedReceiver<Event>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = rx.recv() => match event {
                Some(event) => event,
                None => return,
            },
        };
        if !is_relevant_event(&event) {
            continue;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {
                    info!("Changes detected; rescanning");
                    match run_scan(indexer, cancel.clone()).await {
                        Ok(outcome) => print_summary(&outcome),
                        Err(ScanError::Cancelled) => return,
                        Err(err) => warn!("Auto-rescan failed: {}", err),
                    }
                    break;
                }
                maybe_event = rx.recv() => {
                    if let Some(event) = maybe_event {
                        if !is_relevant_event(&event) {
                            continue;
                        }
                    } else {
                        return;
                    }
                }
            }
        }
    }
}

fn is_relevant_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
