mod contribution;

use std::collections::{HashMap, HashSet};

use common::{DateRange, Name, ReleaseType, Uid};
use tracing::{debug, warn};
use uuid::Uuid;

pub use contribution::Contribution;

use crate::interpret::{PreArtist, PreGenre, PreSong};
use crate::model::{Album, AlbumId, Artist, ArtistId, Genre, GenreId, MusicGraph, Song, SongId};

/// Result of linking one scan's pre-songs.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub graph: MusicGraph,
    /// Pre-songs dropped because an earlier one had the same uid.
    pub duplicates: usize,
}

/// Links pre-songs into the music graph.
///
/// Input order does not matter: pre-songs are sorted by path first, so
/// "first seen" is the smallest path. Genres, artists and albums are each
/// linked over the full set before the next stage starts.
pub fn evaluate(mut pre_songs: Vec<PreSong>) -> Evaluation {
    pre_songs.sort_by(|a, b| a.file.path.cmp(&b.file.path));

    let mut seen: HashSet<Uid> = HashSet::with_capacity(pre_songs.len());
    let mut songs = Vec::with_capacity(pre_songs.len());
    let mut duplicates = 0;
    for song in pre_songs {
        if seen.insert(song.uid) {
            songs.push(song);
        } else {
            duplicates += 1;
            warn!(
                "Dropping {:?}: song uid {} is already taken",
                song.file.path, song.uid
            );
        }
    }

    let genres = link_genres(&songs);
    let artists = link_artists(&songs);
    let albums = link_albums(&songs, &artists);
    let graph = finalize(songs, genres, artists, albums);
    debug!(
        "Linked {} songs, {} albums, {} artists, {} genres",
        graph.songs.len(),
        graph.albums.len(),
        graph.artists.len(),
        graph.genres.len()
    );
    Evaluation { graph, duplicates }
}

struct GenreLinks {
    names: Vec<Contribution<String, PreGenre>>,
    song_genres: Vec<Vec<usize>>,
}

fn link_genres(songs: &[PreSong]) -> GenreLinks {
    let mut index: HashMap<Option<String>, usize> = HashMap::new();
    let mut names: Vec<Contribution<String, PreGenre>> = Vec::new();
    let mut song_genres = Vec::with_capacity(songs.len());
    for song in songs {
        let mut ids = Vec::new();
        for genre in &song.genres {
            let raw = genre.raw_name.clone().unwrap_or_default();
            let key = genre.raw_name.as_deref().map(str::to_lowercase);
            let id = match index.get(&key) {
                Some(&id) => {
                    names[id].add(raw, genre.clone());
                    id
                }
                None => {
                    names.push(Contribution::new(raw, genre.clone()));
                    index.insert(key, names.len() - 1);
                    names.len() - 1
                }
            };
            push_unique(&mut ids, id);
        }
        song_genres.push(ids);
    }
    GenreLinks { names, song_genres }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Track,
    Album,
}

struct ArtistFragment<'a> {
    song: usize,
    role: Role,
    position: usize,
    artist: &'a PreArtist,
}

struct ArtistNode {
    uid: Uid,
    musicbrainz_id: Option<Uuid>,
    names: Contribution<String, PreArtist>,
}

struct ArtistLinks {
    nodes: Vec<ArtistNode>,
    song_artists: Vec<Vec<usize>>,
    album_artists: Vec<Vec<usize>>,
}

/// Track and album artists share one namespace keyed by lowercased name.
/// Name groups that end up with the same uid, such as spelling variants
/// tagged with one MusicBrainz id, are melded afterwards.
fn link_artists(songs: &[PreSong]) -> ArtistLinks {
    let mut index: HashMap<Option<String>, usize> = HashMap::new();
    let mut groups: Vec<Vec<ArtistFragment<'_>>> = Vec::new();
    for (song_index, song) in songs.iter().enumerate() {
        let track = song.artists.iter().enumerate().map(|(i, a)| (Role::Track, i, a));
        let album = song
            .album
            .artists
            .iter()
            .enumerate()
            .map(|(i, a)| (Role::Album, i, a));
        for (role, position, artist) in track.chain(album) {
            let key = artist.raw_name.as_deref().map(str::to_lowercase);
            let group = match index.get(&key) {
                Some(&group) => group,
                None => {
                    groups.push(Vec::new());
                    index.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };
            groups[group].push(ArtistFragment {
                song: song_index,
                role,
                position,
                artist,
            });
        }
    }

    let bundles: Vec<Vec<ArtistFragment<'_>>> = groups
        .into_iter()
        .flat_map(|group| bundle_by_musicbrainz_id(group, |f| f.artist.musicbrainz_id))
        .collect();

    let mut nodes: Vec<ArtistNode> = Vec::new();
    let mut track_slots: Vec<Vec<Option<usize>>> =
        songs.iter().map(|s| vec![None; s.artists.len()]).collect();
    let mut album_slots: Vec<Vec<Option<usize>>> =
        songs.iter().map(|s| vec![None; s.album.artists.len()]).collect();

    let clusters = cluster_by_uid(bundles, |bundle| {
        artist_names(bundle).map(|names| names.resolve().uid)
    });
    for cluster in clusters {
        let identity = match cluster.first().and_then(|bundle| artist_names(bundle)) {
            Some(names) => names.resolve().clone(),
            None => continue,
        };
        if cluster.len() > 1 {
            debug!(
                "Melding {} artist groups sharing uid {}",
                cluster.len(),
                identity.uid
            );
        }
        let fragments: Vec<ArtistFragment<'_>> = cluster.into_iter().flatten().collect();
        let names = match artist_names(&fragments) {
            Some(names) => names,
            None => continue,
        };
        let id = nodes.len();
        for fragment in &fragments {
            let slots = match fragment.role {
                Role::Track => &mut track_slots[fragment.song],
                Role::Album => &mut album_slots[fragment.song],
            };
            slots[fragment.position] = Some(id);
        }
        nodes.push(ArtistNode {
            uid: identity.uid,
            musicbrainz_id: identity.musicbrainz_id,
            names,
        });
    }

    ArtistLinks {
        nodes,
        song_artists: track_slots.into_iter().map(collect_slots).collect(),
        album_artists: album_slots.into_iter().map(collect_slots).collect(),
    }
}

fn artist_names(fragments: &[ArtistFragment<'_>]) -> Option<Contribution<String, PreArtist>> {
    let mut fragments = fragments.iter();
    let first = fragments.next()?;
    let mut names = Contribution::new(raw_key(first.artist), first.artist.clone());
    for fragment in fragments {
        names.add(raw_key(fragment.artist), fragment.artist.clone());
    }
    Some(names)
}

#[derive(Clone)]
struct AlbumCandidate {
    uid: Uid,
    name: Name,
    musicbrainz_id: Option<Uuid>,
}

struct AlbumBuilder {
    uid: Uid,
    musicbrainz_id: Option<Uuid>,
    names: Contribution<String, AlbumCandidate>,
    release_types: Contribution<ReleaseType, ReleaseType>,
    artists: Vec<usize>,
}

struct AlbumLinks {
    builders: Vec<AlbumBuilder>,
    song_album: Vec<usize>,
}

/// Albums are keyed by lowercased name plus the resolved album-artist set,
/// so equally named albums by different artists stay apart. Groups that
/// resolve to one uid, like a release tagged with a single MusicBrainz id
/// but credited differently, are melded and keep every album artist.
fn link_albums(songs: &[PreSong], artists: &ArtistLinks) -> AlbumLinks {
    let mut index: HashMap<(String, Vec<usize>), usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (song_index, song) in songs.iter().enumerate() {
        let mut artist_set = artists.album_artists[song_index].clone();
        artist_set.sort_unstable();
        let key = (song.album.raw_name.to_lowercase(), artist_set);
        let group = match index.get(&key) {
            Some(&group) => group,
            None => {
                groups.push(Vec::new());
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[group].push(song_index);
    }

    let bundles: Vec<Vec<usize>> = groups
        .into_iter()
        .flat_map(|group| bundle_by_musicbrainz_id(group, |&s| songs[s].album.musicbrainz_id))
        .collect();

    let mut builders: Vec<AlbumBuilder> = Vec::new();
    let mut song_album = vec![0; songs.len()];
    let clusters = cluster_by_uid(bundles, |bundle| {
        album_names(songs, bundle).map(|names| names.resolve().uid)
    });
    for cluster in clusters {
        let identity = match cluster.first().and_then(|bundle| album_names(songs, bundle)) {
            Some(names) => names.resolve().clone(),
            None => continue,
        };
        if cluster.len() > 1 {
            debug!(
                "Melding {} album groups sharing uid {}",
                cluster.len(),
                identity.uid
            );
        }
        let mut album_artists = Vec::new();
        for bundle in &cluster {
            if let Some(&first) = bundle.first() {
                for &artist in &artists.album_artists[first] {
                    push_unique(&mut album_artists, artist);
                }
            }
        }
        let members: Vec<usize> = cluster.into_iter().flatten().collect();
        let (names, release_types) = match (
            album_names(songs, &members),
            album_release_types(songs, &members),
        ) {
            (Some(names), Some(release_types)) => (names, release_types),
            _ => continue,
        };
        let id = builders.len();
        for &member in &members {
            song_album[member] = id;
        }
        builders.push(AlbumBuilder {
            uid: identity.uid,
            musicbrainz_id: identity.musicbrainz_id,
            names,
            release_types,
            artists: album_artists,
        });
    }
    AlbumLinks {
        builders,
        song_album,
    }
}

fn album_names(
    songs: &[PreSong],
    members: &[usize],
) -> Option<Contribution<String, AlbumCandidate>> {
    let mut members = members.iter().map(|&member| &songs[member]);
    let first = members.next()?;
    let mut names = Contribution::new(first.album.raw_name.clone(), album_candidate(first));
    for song in members {
        names.add(song.album.raw_name.clone(), album_candidate(song));
    }
    Some(names)
}

fn album_release_types(
    songs: &[PreSong],
    members: &[usize],
) -> Option<Contribution<ReleaseType, ReleaseType>> {
    let mut types = members.iter().map(|&member| songs[member].album.release_type);
    let first = types.next()?;
    let mut contribution = Contribution::new(first, first);
    for release_type in types {
        contribution.add(release_type, release_type);
    }
    Some(contribution)
}

fn album_candidate(song: &PreSong) -> AlbumCandidate {
    AlbumCandidate {
        uid: song.album.uid,
        name: song.album.name.clone(),
        musicbrainz_id: song.album.musicbrainz_id,
    }
}

/// Splits one name group by MusicBrainz id. Several tagged ids with no
/// untagged member are distinct entities that happen to share a name.
/// Otherwise the whole group is one entity.
fn bundle_by_musicbrainz_id<T>(items: Vec<T>, id_of: impl Fn(&T) -> Option<Uuid>) -> Vec<Vec<T>> {
    let mut ids: Vec<Option<Uuid>> = Vec::new();
    for item in &items {
        let id = id_of(item);
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.len() <= 1 || ids.iter().any(Option::is_none) {
        return vec![items];
    }
    let mut bundles: Vec<Vec<T>> = ids.iter().map(|_| Vec::new()).collect();
    for item in items {
        let id = id_of(&item);
        let slot = ids.iter().position(|candidate| *candidate == id).unwrap_or(0);
        bundles[slot].push(item);
    }
    bundles
}

/// Groups bundles that resolve to the same uid, in order of first
/// appearance. Within a cluster the most populated bundle comes first
/// (earliest on ties) and gives the melded entity its identity.
fn cluster_by_uid<T>(
    bundles: Vec<Vec<T>>,
    uid_of: impl Fn(&[T]) -> Option<Uid>,
) -> Vec<Vec<Vec<T>>> {
    let mut index: HashMap<Uid, usize> = HashMap::new();
    let mut clusters: Vec<Vec<Vec<T>>> = Vec::new();
    for bundle in bundles {
        let uid = match uid_of(&bundle) {
            Some(uid) => uid,
            None => continue,
        };
        match index.get(&uid) {
            Some(&cluster) => clusters[cluster].push(bundle),
            None => {
                index.insert(uid, clusters.len());
                clusters.push(vec![bundle]);
            }
        }
    }
    for cluster in &mut clusters {
        let mut largest = 0;
        for (position, bundle) in cluster.iter().enumerate() {
            if bundle.len() > cluster[largest].len() {
                largest = position;
            }
        }
        cluster[..=largest].rotate_right(1);
    }
    clusters
}

fn finalize(
    pre_songs: Vec<PreSong>,
    genres: GenreLinks,
    artists: ArtistLinks,
    albums: AlbumLinks,
) -> MusicGraph {
    let songs: Vec<Song> = pre_songs
        .into_iter()
        .enumerate()
        .map(|(index, pre)| Song {
            uid: pre.uid,
            name: pre.name,
            uri: pre.file.uri,
            path: pre.file.path,
            mime_type: pre.file.mime_type,
            size: pre.file.size,
            last_modified_ms: pre.file.last_modified_ms,
            track: pre.track,
            disc: pre.disc,
            date: pre.date,
            duration_ms: pre.duration_ms,
            sample_rate: pre.sample_rate,
            bitrate: pre.bitrate,
            replay_gain: pre.replay_gain,
            has_cover: pre.has_cover,
            album: AlbumId(albums.song_album[index]),
            artists: artists.song_artists[index].iter().map(|&a| ArtistId(a)).collect(),
            genres: genres.song_genres[index].iter().map(|&g| GenreId(g)).collect(),
        })
        .collect();

    let mut album_songs: Vec<Vec<SongId>> = vec![Vec::new(); albums.builders.len()];
    let mut artist_songs: Vec<Vec<SongId>> = vec![Vec::new(); artists.nodes.len()];
    let mut genre_songs: Vec<Vec<SongId>> = vec![Vec::new(); genres.names.len()];
    for (index, song) in songs.iter().enumerate() {
        album_songs[song.album.0].push(SongId(index));
        for artist in &song.artists {
            artist_songs[artist.0].push(SongId(index));
        }
        for genre in &song.genres {
            genre_songs[genre.0].push(SongId(index));
        }
    }

    let albums: Vec<Album> = albums
        .builders
        .into_iter()
        .zip(album_songs)
        .map(|(builder, mut ids)| {
            ids.sort_by(|a, b| {
                let (a, b) = (&songs[a.0], &songs[b.0]);
                let a_disc = a.disc.as_ref().map(|d| d.number);
                let b_disc = b.disc.as_ref().map(|d| d.number);
                a_disc
                    .cmp(&b_disc)
                    .then_with(|| a.track.cmp(&b.track))
                    .then_with(|| a.name.cmp(&b.name))
            });
            Album {
                uid: builder.uid,
                name: builder.names.resolve().name.clone(),
                release_type: *builder.release_types.resolve(),
                musicbrainz_id: builder.musicbrainz_id,
                dates: DateRange::from_dates(ids.iter().filter_map(|id| songs[id.0].date.as_ref())),
                duration_ms: ids.iter().map(|id| songs[id.0].duration_ms).sum(),
                date_added_ms: ids
                    .iter()
                    .map(|id| songs[id.0].last_modified_ms)
                    .min()
                    .unwrap_or(0),
                songs: ids,
                artists: builder.artists.into_iter().map(ArtistId).collect(),
            }
        })
        .collect();

    let mut explicit_albums: Vec<Vec<AlbumId>> = vec![Vec::new(); artists.nodes.len()];
    for (index, album) in albums.iter().enumerate() {
        for artist in &album.artists {
            push_unique(&mut explicit_albums[artist.0], AlbumId(index));
        }
    }

    let artists: Vec<Artist> = artists
        .nodes
        .into_iter()
        .zip(artist_songs)
        .zip(explicit_albums)
        .map(|((node, ids), explicit)| {
            let mut implicit = Vec::new();
            let mut genre_counts: Vec<(GenreId, usize)> = Vec::new();
            for id in &ids {
                let song = &songs[id.0];
                if !explicit.contains(&song.album) {
                    push_unique(&mut implicit, song.album);
                }
                for genre in &song.genres {
                    match genre_counts.iter_mut().find(|(g, _)| g == genre) {
                        Some((_, count)) => *count += 1,
                        None => genre_counts.push((*genre, 1)),
                    }
                }
            }
            genre_counts.sort_by(|a, b| b.1.cmp(&a.1));
            Artist {
                uid: node.uid,
                name: node.names.resolve().name.clone(),
                musicbrainz_id: node.musicbrainz_id,
                duration_ms: ids.iter().map(|id| songs[id.0].duration_ms).sum(),
                songs: ids,
                explicit_albums: explicit,
                implicit_albums: implicit,
                genres: genre_counts.into_iter().map(|(genre, _)| genre).collect(),
            }
        })
        .collect();

    let genres: Vec<Genre> = genres
        .names
        .into_iter()
        .zip(genre_songs)
        .map(|(names, ids)| {
            let resolved = names.resolve();
            let mut genre_artists = Vec::new();
            let mut genre_albums = Vec::new();
            for id in &ids {
                let song = &songs[id.0];
                for artist in &song.artists {
                    push_unique(&mut genre_artists, *artist);
                }
                push_unique(&mut genre_albums, song.album);
            }
            Genre {
                uid: resolved.uid,
                name: resolved.name.clone(),
                duration_ms: ids.iter().map(|id| songs[id.0].duration_ms).sum(),
                songs: ids,
                artists: genre_artists,
                albums: genre_albums,
            }
        })
        .collect();

    MusicGraph {
        songs,
        albums,
        artists,
        genres,
    }
}

fn raw_key(artist: &PreArtist) -> String {
    artist.raw_name.clone().unwrap_or_default()
}

fn collect_slots(slots: Vec<Option<usize>>) -> Vec<usize> {
    let mut ids = Vec::with_capacity(slots.len());
    for id in slots.into_iter().flatten() {
        push_unique(&mut ids, id);
    }
    ids
}

fn push_unique<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}
