use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{parent_dir_name, path_to_slash_string, MusicType, Name, Naming, Uid};
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::m3u::{read_m3u, M3uPlaylist};
use crate::model::{MusicGraph, SongId};
use crate::{decode_value, encode_value, LibraryError};

const PLAYLISTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("playlists");

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaylistPointer {
    Uid(Uid),
    Path(PathBuf),
}

/// A playlist as persisted. Pointers that do not resolve are kept here
/// so the songs reappear once their files do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDefinition {
    pub uid: Uid,
    pub name: String,
    pub pointers: Vec<PlaylistPointer>,
}

impl PlaylistDefinition {
    /// Imported playlists are identified by the path of their file.
    pub fn imported(path: &Path, playlist: M3uPlaylist) -> Self {
        let slashed = path_to_slash_string(path);
        Self {
            uid: Uid::hashed(MusicType::Playlist, |h| h.update_str(Some(slashed.as_str()))),
            name: playlist.name,
            pointers: playlist
                .paths
                .into_iter()
                .map(PlaylistPointer::Path)
                .collect(),
        }
    }
}

/// A playlist materialized against the current graph.
#[derive(Clone, Debug)]
pub struct Playlist {
    pub uid: Uid,
    pub name: Name,
    pub songs: Vec<SongId>,
    pub duration_ms: u64,
}

#[derive(Clone)]
pub struct PlaylistStore {
    db: Arc<Database>,
}

impl PlaylistStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn list(&self) -> Result<Vec<PlaylistDefinition>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(PLAYLISTS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut items = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            match decode_value::<PlaylistDefinition>(entry.1.value()) {
                Ok(definition) => items.push(definition),
                Err(err) => warn!("Skipping unreadable playlist {}: {}", entry.0.value(), err),
            }
        }
        Ok(items)
    }

    pub fn get(&self, uid: &Uid) -> Result<Option<PlaylistDefinition>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(PLAYLISTS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let key = uid.to_string();
        let definition = match table.get(key.as_str())? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(definition)
    }

    pub fn put(&self, definition: &PlaylistDefinition) -> Result<(), LibraryError> {
        let key = definition.uid.to_string();
        let bytes = encode_value(definition)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PLAYLISTS_TABLE)?;
            table.insert(key.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn delete(&self, uid: &Uid) -> Result<bool, LibraryError> {
        let key = uid.to_string();
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut table = match write_txn.open_table(PLAYLISTS_TABLE) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(false),
                Err(err) => return Err(err.into()),
            };
            let removed = table.remove(key.as_str())?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(deleted)
    }
}

/// Reads every playlist file the explorer found. Unreadable or empty
/// files are skipped.
pub fn import_playlist_files(paths: &[PathBuf]) -> Vec<PlaylistDefinition> {
    let mut definitions = Vec::new();
    for path in paths {
        match read_m3u(path) {
            Ok(Some(playlist)) => definitions.push(PlaylistDefinition::imported(path, playlist)),
            Ok(None) => debug!("Skipping empty playlist {:?}", path),
            Err(err) => warn!("Failed to read playlist {:?}: {}", path, err),
        }
    }
    definitions
}

/// Stored definitions replace imported ones with the same uid.
pub fn merge_definitions(
    imported: Vec<PlaylistDefinition>,
    stored: Vec<PlaylistDefinition>,
) -> Vec<PlaylistDefinition> {
    let mut merged = stored;
    for definition in imported {
        if !merged.iter().any(|existing| existing.uid == definition.uid) {
            merged.push(definition);
        }
    }
    merged
}

/// Song lookups used to resolve playlist pointers.
#[derive(Debug, Default)]
pub struct SongIndex {
    by_uid: HashMap<Uid, SongId>,
    by_path: HashMap<PathBuf, SongId>,
    by_file: HashMap<(String, String), SongId>,
}

impl SongIndex {
    pub fn new(graph: &MusicGraph) -> Self {
        let mut index = SongIndex::default();
        for (position, song) in graph.songs.iter().enumerate() {
            let id = SongId(position);
            index.by_uid.entry(song.uid).or_insert(id);
            index.by_path.entry(song.path.clone()).or_insert(id);
            if let Some(key) = file_key(&song.path) {
                index.by_file.entry(key).or_insert(id);
            }
        }
        index
    }

    pub fn find_uid(&self, uid: &Uid) -> Option<SongId> {
        self.by_uid.get(uid).copied()
    }

    /// Exact path first, then parent directory and file name ignoring case.
    pub fn find_path(&self, path: &Path) -> Option<SongId> {
        if let Some(id) = self.by_path.get(path) {
            return Some(*id);
        }
        file_key(path).and_then(|key| self.by_file.get(&key).copied())
    }

    pub fn resolve(&self, pointer: &PlaylistPointer) -> Option<SongId> {
        match pointer {
            PlaylistPointer::Uid(uid) => self.find_uid(uid),
            PlaylistPointer::Path(path) => self.find_path(path),
        }
    }
}

fn file_key(path: &Path) -> Option<(String, String)> {
    let file = path.file_name()?.to_string_lossy().to_lowercase();
    let parent = parent_dir_name(path).unwrap_or_default().to_lowercase();
    Some((parent, file))
}

pub fn link_playlist(
    definition: &PlaylistDefinition,
    graph: &MusicGraph,
    index: &SongIndex,
    naming: Naming,
) -> Playlist {
    let songs: Vec<SongId> = definition
        .pointers
        .iter()
        .filter_map(|pointer| index.resolve(pointer))
        .collect();
    let unresolved = definition.pointers.len() - songs.len();
    if unresolved > 0 {
        debug!(
            "Playlist {:?}: {} of {} entries not in library",
            definition.name,
            unresolved,
            definition.pointers.len()
        );
    }
    let duration_ms = songs
        .iter()
        .filter_map(|id| graph.song(*id))
        .map(|song| song.duration_ms)
        .sum();
    Playlist {
        uid: definition.uid,
        name: naming.known(&definition.name, None),
        songs,
        duration_ms,
    }
}

pub fn link_playlists(
    definitions: &[PlaylistDefinition],
    graph: &MusicGraph,
    index: &SongIndex,
    naming: Naming,
) -> Vec<Playlist> {
    let mut playlists: Vec<Playlist> = definitions
        .iter()
        .map(|definition| link_playlist(definition, graph, index, naming))
        .collect();
    playlists.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uid.cmp(&b.uid)));
    playlists
}
