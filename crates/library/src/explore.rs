use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use common::{file_uri, DeviceFile};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pipeline::ProgressReporter;
use crate::ScanError;

#[derive(Debug, Default)]
pub struct ExploreOutput {
    pub playlists: Vec<PathBuf>,
    pub inaccessible_roots: Vec<PathBuf>,
    pub directories: usize,
    pub skipped_directories: usize,
}

#[derive(Default)]
struct DirListing {
    dir: PathBuf,
    subdirs: Vec<PathBuf>,
    playlists: Vec<PathBuf>,
    unreadable: bool,
}

enum EntryKind {
    Audio(String),
    Playlist,
    Other,
}

/// Walks every root and sends audio files into `files`.
///
/// Directories are listed concurrently, at most `concurrency` at a time.
/// Playlist files are collected and returned instead of being sent. A
/// root only counts as accessible once it has been listed; the scan fails
/// when none can be.
pub async fn explore(
    roots: Vec<PathBuf>,
    concurrency: usize,
    files: Sender<DeviceFile>,
    progress: ProgressReporter,
    cancel: CancellationToken,
) -> Result<ExploreOutput, ScanError> {
    let mut output = ExploreOutput::default();
    let mut accessible = Vec::new();
    for root in &roots {
        match tokio::fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => accessible.push(root.clone()),
            Ok(_) => {
                warn!("Music root {:?} is not a directory", root);
                output.inaccessible_roots.push(root.clone());
            }
            Err(err) => {
                warn!("Music root {:?} is not accessible: {}", root, err);
                output.inaccessible_roots.push(root.clone());
            }
        }
    }
    if accessible.is_empty() {
        return Err(ScanError::NoAccessibleRoots(roots));
    }

    let mut pending: VecDeque<PathBuf> = accessible.into();
    let mut listings = JoinSet::new();
    let concurrency = concurrency.max(1);

    loop {
        while listings.len() < concurrency {
            let dir = match pending.pop_front() {
                Some(dir) => dir,
                None => break,
            };
            listings.spawn(list_dir(
                dir,
                files.clone(),
                progress.clone(),
                cancel.clone(),
            ));
        }

        let joined = match listings.join_next().await {
            Some(joined) => joined,
            None => break,
        };
        match joined {
            Ok(listing) => {
                output.directories += 1;
                if listing.unreadable {
                    if roots.contains(&listing.dir) {
                        output.inaccessible_roots.push(listing.dir);
                    } else {
                        output.skipped_directories += 1;
                    }
                }
                pending.extend(listing.subdirs);
                output.playlists.extend(listing.playlists);
            }
            Err(err) => warn!("Directory listing task failed: {}", err),
        }

        if cancel.is_cancelled() {
            listings.abort_all();
            break;
        }
    }

    if output.inaccessible_roots.len() == roots.len() {
        return Err(ScanError::NoAccessibleRoots(roots));
    }

    debug!(
        "Explored {} directories ({} skipped), {} playlists",
        output.directories,
        output.skipped_directories,
        output.playlists.len()
    );
    Ok(output)
}

async fn list_dir(
    dir: PathBuf,
    files: Sender<DeviceFile>,
    progress: ProgressReporter,
    cancel: CancellationToken,
) -> DirListing {
    let mut listing = DirListing {
        dir: dir.clone(),
        ..DirListing::default()
    };
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Skipping unreadable directory {:?}: {}", dir, err);
            listing.unreadable = true;
            return listing;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!("Stopped listing {:?}: {}", dir, err);
                break;
            }
        };
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(err) => {
                warn!("Skipping {:?}: {}", entry.path(), err);
                continue;
            }
        };
        let path = entry.path();
        if file_type.is_dir() {
            listing.subdirs.push(path);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        match classify(&path) {
            EntryKind::Playlist => listing.playlists.push(path),
            EntryKind::Audio(mime_type) => {
                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(err) => {
                        warn!("Skipping {:?}: {}", path, err);
                        continue;
                    }
                };
                let last_modified_ms = metadata
                    .modified()
                    .ok()
                    .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                    .map(|elapsed| elapsed.as_millis() as u64)
                    .unwrap_or(0);
                let file = DeviceFile {
                    uri: file_uri(&path),
                    path,
                    mime_type,
                    size: metadata.len(),
                    last_modified_ms,
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return listing,
                    sent = files.send(file) => {
                        if sent.is_err() {
                            return listing;
                        }
                    }
                }
                progress.explored();
            }
            EntryKind::Other => {}
        }
    }

    listing
}

fn classify(path: &Path) -> EntryKind {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "m3u" || ext == "m3u8" {
        return EntryKind::Playlist;
    }
    match mime_guess::from_path(path).first() {
        Some(mime)
            if mime.type_() == mime_guess::mime::AUDIO
                && !mime.subtype().as_str().contains("mpegurl")
                && mime.subtype().as_str() != "x-scpls" =>
        {
            EntryKind::Audio(mime.essence_str().to_string())
        }
        _ => EntryKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::explore;
    use crate::pipeline::ProgressReporter;
    use crate::ScanError;
    use std::fs;
    use std::path::PathBuf;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn touch(path: PathBuf) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[tokio::test]
    async fn finds_audio_and_routes_playlists() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        touch(root.join("Artist/Album/01.mp3"));
        touch(root.join("Artist/Album/02.flac"));
        touch(root.join("Artist/Album/cover.jpg"));
        touch(root.join("Other/deep/er/track.ogg"));
        touch(root.join("notes.txt"));
        touch(root.join("mix.m3u"));
        touch(root.join("Other/road.m3u8"));

        let (tx, mut rx) = mpsc::channel(2);
        let handle = tokio::spawn(explore(
            vec![root.clone()],
            4,
            tx,
            ProgressReporter::default(),
            CancellationToken::new(),
        ));

        let mut found = Vec::new();
        while let Some(file) = rx.recv().await {
            found.push(file);
        }
        let output = handle.await.unwrap().unwrap();

        let mut names: Vec<String> = found
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["01.mp3", "02.flac", "track.ogg"]);
        assert!(found.iter().all(|f| f.mime_type.starts_with("audio/")));
        assert!(found.iter().all(|f| f.uri.starts_with("file://") && f.size == 1));

        let mut playlists = output.playlists.clone();
        playlists.sort();
        assert_eq!(playlists, vec![root.join("Other/road.m3u8"), root.join("mix.m3u")]);
        assert_eq!(output.skipped_directories, 0);
    }

    #[tokio::test]
    async fn missing_roots_are_fatal_only_when_all_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        let (tx, _rx) = mpsc::channel(4);
        let result = explore(
            vec![missing.clone()],
            4,
            tx,
            ProgressReporter::default(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            result,
            Err(ScanError::NoAccessibleRoots(roots)) if roots == vec![missing.clone()]
        ));

        touch(dir.path().join("present/a.mp3"));
        let (tx, mut rx) = mpsc::channel(4);
        let result = explore(
            vec![missing, dir.path().join("present")],
            4,
            tx,
            ProgressReporter::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(result.inaccessible_roots, vec![dir.path().join("missing")]);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn cancelled_exploration_stops_early() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            touch(dir.path().join(format!("d{}/song.mp3", i)));
        }
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, mut rx) = mpsc::channel(64);
        let output = explore(
            vec![dir.path().to_path_buf()],
            1,
            tx,
            ProgressReporter::default(),
            cancel,
        )
        .await
        .unwrap();
        assert_eq!(output.directories, 1);
        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 0);
    }

    /// Locks `dir` and reports whether reads are actually denied. Runs with
    /// elevated privileges ignore the mode, and the caller then skips.
    #[cfg(unix)]
    fn lock(dir: &std::path::Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(dir).is_ok() {
            unlock(dir);
            return false;
        }
        true
    }

    #[cfg(unix)]
    fn unlock(dir: &std::path::Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_subdirectory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path().join("open/a.mp3"));
        touch(dir.path().join("locked/b.mp3"));
        let locked = dir.path().join("locked");
        if !lock(&locked) {
            return;
        }

        let (tx, mut rx) = mpsc::channel(8);
        let result = explore(
            vec![dir.path().to_path_buf()],
            2,
            tx,
            ProgressReporter::default(),
            CancellationToken::new(),
        )
        .await;
        unlock(&locked);

        let output = result.unwrap();
        assert_eq!(output.skipped_directories, 1);
        assert!(output.inaccessible_roots.is_empty());
        let file = rx.recv().await.unwrap();
        assert!(file.path.ends_with("open/a.mp3"));
        assert!(rx.recv().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unlistable_root_is_not_accessible() {
        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        touch(locked.join("b.mp3"));
        if !lock(&locked) {
            return;
        }

        let (tx, _rx) = mpsc::channel(8);
        let result = explore(
            vec![locked.clone()],
            2,
            tx,
            ProgressReporter::default(),
            CancellationToken::new(),
        )
        .await;
        unlock(&locked);

        assert!(matches!(result, Err(ScanError::NoAccessibleRoots(_))));
    }
}
