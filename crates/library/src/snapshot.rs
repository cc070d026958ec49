use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{MusicType, Naming, Uid};
use tracing::info;

use crate::m3u::{read_m3u, render_m3u, ExportConfig};
use crate::model::{Album, AlbumId, Artist, ArtistId, Genre, GenreId, MusicGraph, Song};
use crate::playlist::{
    link_playlists, Playlist, PlaylistDefinition, PlaylistPointer, PlaylistStore, SongIndex,
};
use crate::LibraryError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub songs: usize,
    pub albums: usize,
    pub artists: usize,
    pub genres: usize,
    pub playlists: usize,
}

#[derive(Default)]
struct LibraryIndex {
    songs: SongIndex,
    albums: HashMap<Uid, AlbumId>,
    artists: HashMap<Uid, ArtistId>,
    genres: HashMap<Uid, GenreId>,
}

impl LibraryIndex {
    fn new(graph: &MusicGraph) -> Self {
        let mut index = LibraryIndex {
            songs: SongIndex::new(graph),
            ..LibraryIndex::default()
        };
        for (position, album) in graph.albums.iter().enumerate() {
            index.albums.entry(album.uid).or_insert(AlbumId(position));
        }
        for (position, artist) in graph.artists.iter().enumerate() {
            index.artists.entry(artist.uid).or_insert(ArtistId(position));
        }
        for (position, genre) in graph.genres.iter().enumerate() {
            index.genres.entry(genre.uid).or_insert(GenreId(position));
        }
        index
    }
}

/// An immutable snapshot of the music graph and its playlists.
///
/// Cloning is cheap. Playlist edits persist to the store and return a new
/// snapshot that shares the graph with this one.
#[derive(Clone)]
pub struct Library {
    graph: Arc<MusicGraph>,
    index: Arc<LibraryIndex>,
    definitions: Arc<Vec<PlaylistDefinition>>,
    playlists: Arc<Vec<Playlist>>,
    store: Option<PlaylistStore>,
    naming: Naming,
}

impl Library {
    pub fn new(
        graph: MusicGraph,
        definitions: Vec<PlaylistDefinition>,
        store: Option<PlaylistStore>,
        naming: Naming,
    ) -> Self {
        let index = LibraryIndex::new(&graph);
        let playlists = link_playlists(&definitions, &graph, &index.songs, naming);
        Self {
            graph: Arc::new(graph),
            index: Arc::new(index),
            definitions: Arc::new(definitions),
            playlists: Arc::new(playlists),
            store,
            naming,
        }
    }

    pub fn graph(&self) -> &MusicGraph {
        &self.graph
    }

    pub fn songs(&self) -> &[Song] {
        &self.graph.songs
    }

    pub fn albums(&self) -> &[Album] {
        &self.graph.albums
    }

    pub fn artists(&self) -> &[Artist] {
        &self.graph.artists
    }

    pub fn genres(&self) -> &[Genre] {
        &self.graph.genres
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn stats(&self) -> LibraryStats {
        LibraryStats {
            songs: self.graph.songs.len(),
            albums: self.graph.albums.len(),
            artists: self.graph.artists.len(),
            genres: self.graph.genres.len(),
            playlists: self.playlists.len(),
        }
    }

    pub fn find_song(&self, uid: &Uid) -> Option<&Song> {
        self.index
            .songs
            .find_uid(uid)
            .and_then(|id| self.graph.song(id))
    }

    pub fn find_song_by_path(&self, path: &Path) -> Option<&Song> {
        self.index
            .songs
            .find_path(path)
            .and_then(|id| self.graph.song(id))
    }

    pub fn find_album(&self, uid: &Uid) -> Option<&Album> {
        self.index
            .albums
            .get(uid)
            .and_then(|id| self.graph.album(*id))
    }

    pub fn find_artist(&self, uid: &Uid) -> Option<&Artist> {
        self.index
            .artists
            .get(uid)
            .and_then(|id| self.graph.artist(*id))
    }

    pub fn find_genre(&self, uid: &Uid) -> Option<&Genre> {
        self.index
            .genres
            .get(uid)
            .and_then(|id| self.graph.genre(*id))
    }

    pub fn find_playlist(&self, uid: &Uid) -> Option<&Playlist> {
        self.playlists.iter().find(|playlist| playlist.uid == *uid)
    }

    pub fn find_playlist_by_name(&self, name: &str) -> Option<&Playlist> {
        let wanted = name.trim().to_lowercase();
        self.playlists.iter().find(|playlist| {
            playlist
                .name
                .raw()
                .map(|raw| raw.to_lowercase() == wanted)
                .unwrap_or(false)
        })
    }

    /// The persisted form of a playlist, including entries that do not
    /// resolve against this snapshot.
    pub fn playlist_definition(&self, uid: &Uid) -> Option<&PlaylistDefinition> {
        self.definitions.iter().find(|definition| definition.uid == *uid)
    }

    pub fn create_playlist(
        &self,
        name: &str,
        songs: &[Uid],
    ) -> Result<(Library, Uid), LibraryError> {
        let definition = PlaylistDefinition {
            uid: Uid::random(MusicType::Playlist),
            name: name.trim().to_string(),
            pointers: songs.iter().copied().map(PlaylistPointer::Uid).collect(),
        };
        let uid = definition.uid;
        let library = self.with_definition(definition)?;
        Ok((library, uid))
    }

    pub fn rename_playlist(&self, uid: &Uid, name: &str) -> Result<Library, LibraryError> {
        let mut definition = self.existing_definition(uid)?;
        definition.name = name.trim().to_string();
        self.with_definition(definition)
    }

    pub fn add_to_playlist(&self, uid: &Uid, songs: &[Uid]) -> Result<Library, LibraryError> {
        let mut definition = self.existing_definition(uid)?;
        definition
            .pointers
            .extend(songs.iter().copied().map(PlaylistPointer::Uid));
        self.with_definition(definition)
    }

    pub fn rewrite_playlist(&self, uid: &Uid, songs: &[Uid]) -> Result<Library, LibraryError> {
        let mut definition = self.existing_definition(uid)?;
        definition.pointers = songs.iter().copied().map(PlaylistPointer::Uid).collect();
        self.with_definition(definition)
    }

    /// An imported playlist whose file still exists comes back on the next scan.
    pub fn delete_playlist(&self, uid: &Uid) -> Result<Library, LibraryError> {
        let definition = self.existing_definition(uid)?;
        if let Some(store) = &self.store {
            store.delete(&definition.uid)?;
        }
        let definitions = self
            .definitions
            .iter()
            .filter(|existing| existing.uid != definition.uid)
            .cloned()
            .collect();
        Ok(self.with_definitions(definitions))
    }

    /// Stores an M3U file as a playlist definition.
    pub fn import_playlist(&self, path: &Path) -> Result<(Library, Uid), LibraryError> {
        let playlist =
            read_m3u(path)?.ok_or_else(|| LibraryError::EmptyPlaylist(path.to_path_buf()))?;
        let definition = PlaylistDefinition::imported(path, playlist);
        let uid = definition.uid;
        info!("Imported playlist {:?} from {:?}", definition.name, path);
        let library = self.with_definition(definition)?;
        Ok((library, uid))
    }

    pub fn export_playlist(
        &self,
        uid: &Uid,
        path: &Path,
        config: ExportConfig,
    ) -> Result<(), LibraryError> {
        let playlist = self
            .find_playlist(uid)
            .ok_or(LibraryError::PlaylistNotFound(*uid))?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(PathBuf::new);
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(&dir)?;
        }
        let contents = render_m3u(
            &playlist.name.to_string(),
            &playlist.songs,
            &self.graph,
            &dir,
            config,
        );
        fs::write(path, contents)?;
        Ok(())
    }

    fn existing_definition(&self, uid: &Uid) -> Result<PlaylistDefinition, LibraryError> {
        self.playlist_definition(uid)
            .cloned()
            .ok_or(LibraryError::PlaylistNotFound(*uid))
    }

    fn with_definition(&self, definition: PlaylistDefinition) -> Result<Library, LibraryError> {
        if let Some(store) = &self.store {
            store.put(&definition)?;
        }
        let mut definitions: Vec<PlaylistDefinition> = self
            .definitions
            .iter()
            .filter(|existing| existing.uid != definition.uid)
            .cloned()
            .collect();
        definitions.push(definition);
        Ok(self.with_definitions(definitions))
    }

    fn with_definitions(&self, definitions: Vec<PlaylistDefinition>) -> Library {
        let playlists = link_playlists(&definitions, &self.graph, &self.index.songs, self.naming);
        Library {
            graph: Arc::clone(&self.graph),
            index: Arc::clone(&self.index),
            definitions: Arc::new(definitions),
            playlists: Arc::new(playlists),
            store: self.store.clone(),
            naming: self.naming,
        }
    }
}
