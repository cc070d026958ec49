pub mod cache;
pub mod config;
pub mod explore;
pub mod extract;
pub mod graph;
mod id3;
pub mod interpret;
pub mod m3u;
pub mod model;
pub mod pipeline;
pub mod playlist;
pub mod snapshot;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::Uid;
use redb::{
    CommitError, Database, DatabaseError, StorageError, TableDefinition, TableError,
    TransactionError, WriteTransaction,
};
use serde::{Deserialize, Serialize};

pub use cache::{Cache, CacheMode, CacheResult};
pub use config::{ConfigError, IndexerConfig};
pub use extract::{Extracted, ExtractStats, LoftyDecoder, TagDecoder};
pub use graph::{evaluate, Evaluation};
pub use interpret::{interpret, InterpretError, InterpretSettings, Separators};
pub use m3u::ExportConfig;
pub use model::{Album, AlbumId, Artist, ArtistId, Genre, GenreId, MusicGraph, Song, SongId};
pub use pipeline::{Indexer, ProgressReporter, ScanOutcome, ScanProgress, ScanReport};
pub use playlist::{Playlist, PlaylistDefinition, PlaylistPointer, PlaylistStore};
pub use snapshot::{Library, LibraryStats};

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    EmptyPlaylist(PathBuf),
    PlaylistNotFound(Uid),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Redb(err) => write!(f, "db error: {}", err),
            LibraryError::Bincode(err) => write!(f, "bincode error: {}", err),
            LibraryError::EmptyPlaylist(path) => write!(f, "playlist has no entries: {:?}", path),
            LibraryError::PlaylistNotFound(uid) => write!(f, "playlist not found: {}", uid),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<redb::Error> for LibraryError {
    fn from(err: redb::Error) -> Self {
        LibraryError::Redb(err)
    }
}

impl From<DatabaseError> for LibraryError {
    fn from(err: DatabaseError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TableError> for LibraryError {
    fn from(err: TableError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TransactionError> for LibraryError {
    fn from(err: TransactionError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<StorageError> for LibraryError {
    fn from(err: StorageError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<CommitError> for LibraryError {
    fn from(err: CommitError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for LibraryError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LibraryError::Bincode(err)
    }
}

/// Failure of a whole scan. Per-file problems never surface here.
#[derive(Debug)]
pub enum ScanError {
    NoAccessibleRoots(Vec<PathBuf>),
    Cancelled,
    Library(LibraryError),
    Join(String),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::NoAccessibleRoots(roots) => {
                write!(f, "no accessible music roots: {:?}", roots)
            }
            ScanError::Cancelled => write!(f, "scan cancelled"),
            ScanError::Library(err) => write!(f, "{}", err),
            ScanError::Join(message) => write!(f, "scan task failed: {}", message),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<LibraryError> for ScanError {
    fn from(err: LibraryError) -> Self {
        ScanError::Library(err)
    }
}

impl From<tokio::task::JoinError> for ScanError {
    fn from(err: tokio::task::JoinError) -> Self {
        ScanError::Join(err.to_string())
    }
}

pub fn open_db(path: &Path) -> Result<Arc<Database>, LibraryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let db = if path.exists() {
        Database::open(path)?
    } else {
        Database::create(path)?
    };
    Ok(Arc::new(db))
}

pub(crate) fn clear_table(
    txn: &WriteTransaction,
    table: TableDefinition<&str, &[u8]>,
) -> Result<(), LibraryError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, LibraryError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, LibraryError> {
    Ok(bincode::deserialize(bytes)?)
}
