use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::{DeviceFile, Uid};
use library::cache::TagStore;
use library::{
    open_db, CacheMode, Indexer, IndexerConfig, ProgressReporter, ScanError, TagDecoder,
};
use metadata::{MetadataError, RawTags};
use redb::Database;
use tokio_util::sync::CancellationToken;

/// Reads `key=value` lines instead of real audio tags.
#[derive(Default)]
struct TextDecoder {
    calls: AtomicUsize,
}

impl TextDecoder {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TagDecoder for TextDecoder {
    fn decode(&self, file: &DeviceFile) -> Result<RawTags, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = fs::read_to_string(&file.path).map_err(MetadataError::Io)?;
        if text.starts_with("corrupt") {
            return Err(MetadataError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "corrupt",
            )));
        }
        let mut tags = RawTags {
            duration_ms: Some(120_000),
            ..RawTags::default()
        };
        for line in text.lines() {
            let (key, value) = match line.split_once('=') {
                Some(pair) => pair,
                None => continue,
            };
            let values = vec![value.to_string()];
            match key {
                "title" => tags.name = values,
                "album" => tags.album_name = values,
                "artist" => tags.artist_names = values,
                "genre" => tags.genres = values,
                "duration" => tags.duration_ms = value.parse().ok().filter(|d| *d > 0),
                _ => {}
            }
        }
        Ok(tags)
    }
}

fn write_song(root: &Path, relative: &str, title: &str, album: &str, artist: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        path,
        format!("title={}\nalbum={}\nartist={}\ngenre=Rock; Pop\n", title, album, artist),
    )
    .unwrap();
}

fn sample_library(root: &Path) {
    write_song(root, "Foo/Bar/01.mp3", "A", "Bar", "Foo");
    write_song(root, "Foo/Bar/02.mp3", "B", "Bar", "foo");
    write_song(root, "Baz/Bar/01.flac", "C", "Bar", "Baz");
}

struct Harness {
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
    db: Arc<Database>,
    decoder: Arc<TextDecoder>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("music");
        fs::create_dir_all(&root).unwrap();
        let db = open_db(&dir.path().join("index.redb")).unwrap();
        Self {
            _dir: dir,
            root,
            db,
            decoder: Arc::new(TextDecoder::default()),
        }
    }

    fn config(&self) -> IndexerConfig {
        IndexerConfig {
            music_roots: vec![self.root.to_string_lossy().to_string()],
            separators: ";".to_string(),
            ..IndexerConfig::default()
        }
    }

    fn indexer(&self, config: IndexerConfig) -> Indexer {
        Indexer::new(config, Arc::clone(&self.db)).with_decoder(self.decoder.clone())
    }

    async fn scan(&self, config: IndexerConfig) -> Result<library::ScanOutcome, ScanError> {
        self.indexer(config)
            .scan(CancellationToken::new(), ProgressReporter::default())
            .await
    }
}

fn song_uids(library: &library::Library) -> BTreeSet<Uid> {
    library.songs().iter().map(|song| song.uid).collect()
}

#[tokio::test]
async fn builds_the_expected_graph() {
    let harness = Harness::new();
    sample_library(&harness.root);

    let outcome = harness.scan(harness.config()).await.unwrap();
    let library = outcome.library;

    assert_eq!(library.songs().len(), 3);
    let mut artists: Vec<String> = library.artists().iter().map(|a| a.name.to_string()).collect();
    artists.sort();
    assert_eq!(artists, vec!["Baz", "Foo"]);
    assert_eq!(library.albums().len(), 2);
    let mut genres: Vec<String> = library.genres().iter().map(|g| g.name.to_string()).collect();
    genres.sort();
    assert_eq!(genres, vec!["Pop", "Rock"]);

    assert_eq!(outcome.report.explored, 3);
    assert_eq!(outcome.report.decoded, 3);
    assert_eq!(outcome.report.cache_hits, 0);
}

#[tokio::test]
async fn second_scan_is_served_from_the_cache() {
    let harness = Harness::new();
    sample_library(&harness.root);

    let first = harness.scan(harness.config()).await.unwrap();
    assert_eq!(harness.decoder.calls(), 3);

    let second = harness.scan(harness.config()).await.unwrap();
    assert_eq!(harness.decoder.calls(), 3);
    assert_eq!(second.report.cache_hits, 3);
    assert_eq!(second.report.decoded, 0);

    assert_eq!(song_uids(&first.library), song_uids(&second.library));
    assert_eq!(first.library.stats(), second.library.stats());
}

#[tokio::test]
async fn changed_mtime_forces_a_decode() {
    let harness = Harness::new();
    sample_library(&harness.root);
    harness.scan(harness.config()).await.unwrap();

    let touched = harness.root.join("Foo/Bar/02.mp3");
    let file = fs::File::options().write(true).open(&touched).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(86_400))
        .unwrap();
    drop(file);

    let outcome = harness.scan(harness.config()).await.unwrap();
    assert_eq!(harness.decoder.calls(), 4);
    assert_eq!(outcome.report.decoded, 1);
    assert_eq!(outcome.report.cache_hits, 2);
}

#[tokio::test]
async fn write_only_cache_decodes_everything_once() {
    let harness = Harness::new();
    sample_library(&harness.root);
    harness.scan(harness.config()).await.unwrap();

    let mut config = harness.config();
    config.cache_mode = CacheMode::WriteOnly;
    let outcome = harness.scan(config).await.unwrap();
    assert_eq!(outcome.report.decoded, 3);

    let outcome = harness.scan(harness.config()).await.unwrap();
    assert_eq!(outcome.report.cache_hits, 3);
    assert_eq!(harness.decoder.calls(), 6);
}

#[tokio::test]
async fn bad_files_are_skipped() {
    let harness = Harness::new();
    sample_library(&harness.root);
    fs::write(harness.root.join("Foo/Bar/broken.mp3"), "corrupt").unwrap();
    fs::write(
        harness.root.join("Foo/Bar/silent.mp3"),
        "title=Silence\nduration=0\n",
    )
    .unwrap();
    fs::write(harness.root.join("Foo/Bar/cover.jpg"), "jpeg").unwrap();

    let outcome = harness.scan(harness.config()).await.unwrap();
    assert_eq!(outcome.report.explored, 5);
    assert_eq!(outcome.report.decode_failures, 1);
    assert_eq!(outcome.report.rejected, 1);
    assert_eq!(outcome.library.songs().len(), 3);
}

#[tokio::test]
async fn duplicate_identity_keeps_one_song() {
    let harness = Harness::new();
    write_song(&harness.root, "a/copy.mp3", "Same", "LP", "Band");
    write_song(&harness.root, "b/copy.mp3", "Same", "LP", "Band");

    let outcome = harness.scan(harness.config()).await.unwrap();
    assert_eq!(outcome.report.duplicates, 1);
    assert_eq!(outcome.library.songs().len(), 1);
    assert!(outcome.library.songs()[0].path.ends_with("a/copy.mp3"));
}

#[tokio::test]
async fn uids_survive_separator_and_naming_changes() {
    let harness = Harness::new();
    sample_library(&harness.root);
    let split = harness.scan(harness.config()).await.unwrap();

    let mut config = harness.config();
    config.separators = String::new();
    config.naming = common::Naming::Simple;
    let unsplit = harness.scan(config).await.unwrap();

    assert_eq!(song_uids(&split.library), song_uids(&unsplit.library));
    assert_eq!(unsplit.library.genres().len(), 1);
    let albums = |library: &library::Library| -> BTreeSet<Uid> {
        library.albums().iter().map(|album| album.uid).collect()
    };
    assert_eq!(albums(&split.library), albums(&unsplit.library));
}

#[tokio::test]
async fn cache_is_pruned_after_a_complete_scan() {
    let harness = Harness::new();
    sample_library(&harness.root);
    harness.scan(harness.config()).await.unwrap();
    assert_eq!(TagStore::open(Arc::clone(&harness.db)).unwrap().count().unwrap(), 3);

    fs::remove_file(harness.root.join("Baz/Bar/01.flac")).unwrap();
    let outcome = harness.scan(harness.config()).await.unwrap();
    assert!(outcome.report.pruned_cache);
    assert_eq!(TagStore::open(Arc::clone(&harness.db)).unwrap().count().unwrap(), 2);

    let mut config = harness.config();
    config.prune_cache = false;
    fs::remove_file(harness.root.join("Foo/Bar/02.mp3")).unwrap();
    let outcome = harness.scan(config).await.unwrap();
    assert!(!outcome.report.pruned_cache);
    assert_eq!(TagStore::open(Arc::clone(&harness.db)).unwrap().count().unwrap(), 2);
}

#[tokio::test]
async fn cancelled_scan_returns_no_library() {
    let harness = Harness::new();
    sample_library(&harness.root);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harness
        .indexer(harness.config())
        .scan(cancel, ProgressReporter::default())
        .await;
    assert!(matches!(result, Err(ScanError::Cancelled)));
}

#[tokio::test]
async fn missing_roots_fail_the_scan() {
    let harness = Harness::new();
    let mut config = harness.config();
    config.music_roots = vec![harness.root.join("nope").to_string_lossy().to_string()];
    let result = harness.scan(config).await;
    assert!(matches!(result, Err(ScanError::NoAccessibleRoots(_))));
}

#[tokio::test]
async fn reports_progress() {
    let harness = Harness::new();
    sample_library(&harness.root);
    let (reporter, rx) = ProgressReporter::channel();
    harness
        .indexer(harness.config())
        .scan(CancellationToken::new(), reporter)
        .await
        .unwrap();
    let progress = *rx.borrow();
    assert_eq!(progress.explored, 3);
    assert_eq!(progress.extracted, 3);
}

#[tokio::test]
async fn imported_playlists_link_and_stored_edits_win() {
    let harness = Harness::new();
    sample_library(&harness.root);
    fs::write(
        harness.root.join("road_trip.m3u"),
        "#EXTM3U\nFoo/Bar/01.mp3\nBaz\\Bar\\01.flac\nmissing.mp3\n",
    )
    .unwrap();

    let outcome = harness.scan(harness.config()).await.unwrap();
    assert_eq!(outcome.report.playlists, 1);
    let playlist = &outcome.library.playlists()[0];
    assert_eq!(playlist.name.to_string(), "road trip");
    assert_eq!(playlist.songs.len(), 2);
    let uid = playlist.uid;

    outcome.library.rename_playlist(&uid, "Edited").unwrap();
    let outcome = harness.scan(harness.config()).await.unwrap();
    assert_eq!(outcome.library.playlists().len(), 1);
    let playlist = outcome.library.find_playlist(&uid).unwrap();
    assert_eq!(playlist.name.to_string(), "Edited");
    assert_eq!(
        outcome
            .library
            .playlist_definition(&uid)
            .unwrap()
            .pointers
            .len(),
        3
    );
}
