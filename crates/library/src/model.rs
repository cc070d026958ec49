use std::path::PathBuf;

use common::{Date, DateRange, Name, ReleaseType, Uid};
use uuid::Uuid;

use crate::interpret::{Disc, ReplayGain};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SongId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlbumId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtistId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenreId(pub usize);

#[derive(Clone, Debug)]
pub struct Song {
    pub uid: Uid,
    pub name: Name,
    pub path: PathBuf,
    pub uri: String,
    pub mime_type: String,
    pub size: u64,
    pub last_modified_ms: u64,
    pub track: Option<u32>,
    pub disc: Option<Disc>,
    pub date: Option<Date>,
    pub duration_ms: u64,
    pub sample_rate: Option<u32>,
    pub bitrate: Option<u32>,
    pub replay_gain: ReplayGain,
    pub has_cover: bool,
    pub album: AlbumId,
    pub artists: Vec<ArtistId>,
    pub genres: Vec<GenreId>,
}

/// Songs are ordered by disc, track, then name.
#[derive(Clone, Debug)]
pub struct Album {
    pub uid: Uid,
    pub name: Name,
    pub release_type: ReleaseType,
    pub musicbrainz_id: Option<Uuid>,
    pub dates: Option<DateRange>,
    pub duration_ms: u64,
    /// Earliest modification time among the album's files.
    pub date_added_ms: u64,
    pub songs: Vec<SongId>,
    pub artists: Vec<ArtistId>,
}

#[derive(Clone, Debug)]
pub struct Artist {
    pub uid: Uid,
    pub name: Name,
    pub musicbrainz_id: Option<Uuid>,
    pub songs: Vec<SongId>,
    /// Albums crediting this artist as an album artist.
    pub explicit_albums: Vec<AlbumId>,
    /// Albums this artist only appears on as a track artist.
    pub implicit_albums: Vec<AlbumId>,
    /// Most frequent first.
    pub genres: Vec<GenreId>,
    pub duration_ms: u64,
}

#[derive(Clone, Debug)]
pub struct Genre {
    pub uid: Uid,
    pub name: Name,
    pub songs: Vec<SongId>,
    pub artists: Vec<ArtistId>,
    pub albums: Vec<AlbumId>,
    pub duration_ms: u64,
}

/// The finalized, read-only music graph. Ids index the vectors directly.
#[derive(Clone, Debug, Default)]
pub struct MusicGraph {
    pub songs: Vec<Song>,
    pub albums: Vec<Album>,
    pub artists: Vec<Artist>,
    pub genres: Vec<Genre>,
}

impl MusicGraph {
    pub fn song(&self, id: SongId) -> Option<&Song> {
        self.songs.get(id.0)
    }

    pub fn album(&self, id: AlbumId) -> Option<&Album> {
        self.albums.get(id.0)
    }

    pub fn artist(&self, id: ArtistId) -> Option<&Artist> {
        self.artists.get(id.0)
    }

    pub fn genre(&self, id: GenreId) -> Option<&Genre> {
        self.genres.get(id.0)
    }

    pub fn song_ids(&self) -> impl Iterator<Item = SongId> + '_ {
        (0..self.songs.len()).map(SongId)
    }
}
