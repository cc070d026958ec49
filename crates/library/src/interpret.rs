use std::fmt;

use common::{
    file_stem, parent_dir_name, Date, DeviceFile, MusicType, Name, Naming, Placeholder,
    ReleaseType, Uid,
};
use metadata::RawTags;
use uuid::Uuid;

use crate::id3::{id3v1_genre, id3v2_genres};

const VARIOUS_ARTISTS: &str = "Various Artists";

/// Characters that split a single-valued tag into several values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Separators {
    chars: Vec<char>,
}

impl Separators {
    pub fn new(chars: impl IntoIterator<Item = char>) -> Self {
        let mut out: Vec<char> = Vec::new();
        for ch in chars {
            if !ch.is_whitespace() && ch != '\\' && !out.contains(&ch) {
                out.push(ch);
            }
        }
        Self { chars: out }
    }

    /// A field with exactly one value is split on unescaped separators.
    /// Fields that already hold several values are only trimmed.
    pub fn split(&self, values: &[String]) -> Vec<String> {
        let values: Vec<String> = values
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();
        if values.len() != 1 || self.chars.is_empty() {
            return values;
        }
        split_escaped(&values[0], |ch| self.chars.contains(&ch))
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    }
}

fn split_escaped(value: &str, is_separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if is_separator(ch) {
            parts.push(std::mem::take(&mut current));
            continue;
        }
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if is_separator(next) {
                    current.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        current.push(ch);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Per-scan settings for the interpreter. Read once when a scan starts.
#[derive(Clone, Debug, Default)]
pub struct InterpretSettings {
    pub separators: Separators,
    pub naming: Naming,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReplayGain {
    pub track: Option<f32>,
    pub album: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disc {
    pub number: u32,
    pub subtitle: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PreArtist {
    pub uid: Uid,
    pub musicbrainz_id: Option<Uuid>,
    pub name: Name,
    pub raw_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PreGenre {
    pub uid: Uid,
    pub name: Name,
    pub raw_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PreAlbum {
    pub uid: Uid,
    pub musicbrainz_id: Option<Uuid>,
    pub name: Name,
    pub raw_name: String,
    pub release_type: ReleaseType,
    pub artists: Vec<PreArtist>,
}

/// One song's normalized metadata, before any deduplication.
#[derive(Clone, Debug)]
pub struct PreSong {
    pub uid: Uid,
    pub file: DeviceFile,
    pub name: Name,
    pub raw_name: String,
    pub track: Option<u32>,
    pub disc: Option<Disc>,
    pub date: Option<Date>,
    pub duration_ms: u64,
    pub sample_rate: Option<u32>,
    pub bitrate: Option<u32>,
    pub replay_gain: ReplayGain,
    pub has_cover: bool,
    pub album: PreAlbum,
    pub artists: Vec<PreArtist>,
    pub genres: Vec<PreGenre>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    MissingPath,
    MissingMimeType,
    MissingDuration,
    MissingName,
    MissingAlbum,
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretError::MissingPath => write!(f, "no path"),
            InterpretError::MissingMimeType => write!(f, "no mime type"),
            InterpretError::MissingDuration => write!(f, "no duration"),
            InterpretError::MissingName => write!(f, "no name"),
            InterpretError::MissingAlbum => write!(f, "no album name"),
        }
    }
}

impl std::error::Error for InterpretError {}

pub fn interpret(
    file: &DeviceFile,
    tags: &RawTags,
    settings: &InterpretSettings,
) -> Result<PreSong, InterpretError> {
    if file.path.as_os_str().is_empty() {
        return Err(InterpretError::MissingPath);
    }
    if file.mime_type.trim().is_empty() {
        return Err(InterpretError::MissingMimeType);
    }
    let duration_ms = tags
        .duration_ms
        .filter(|duration| *duration > 0)
        .ok_or(InterpretError::MissingDuration)?;

    let naming = settings.naming;
    let separators = &settings.separators;

    let raw_name = first_value(&tags.name)
        .or_else(|| file_stem(&file.path))
        .ok_or(InterpretError::MissingName)?;
    let raw_album = first_value(&tags.album_name)
        .or_else(|| parent_dir_name(&file.path))
        .ok_or(InterpretError::MissingAlbum)?;

    let track = parse_position(
        first_value(&tags.track_number).as_deref(),
        first_value(&tags.track_total).as_deref(),
    );
    let disc = parse_position(
        first_value(&tags.disc_number).as_deref(),
        first_value(&tags.disc_total).as_deref(),
    )
    .map(|number| Disc {
        number,
        subtitle: first_value(&tags.disc_subtitle),
    });
    let date = [&tags.original_date, &tags.recording_date, &tags.year]
        .into_iter()
        .find_map(|values| first_value(values).and_then(|value| Date::parse(&value)));

    let compilation = first_value(&tags.compilation)
        .map(|value| value == "1")
        .unwrap_or(false);
    let mut raw_album_artists = trimmed(&tags.album_artist_names);
    let mut release_types = separators.split(&tags.release_types);
    if compilation {
        if raw_album_artists.is_empty() {
            raw_album_artists.push(VARIOUS_ARTISTS.to_string());
        }
        if release_types.is_empty() {
            release_types.push("compilation".to_string());
        }
    }
    let raw_artists = trimmed(&tags.artist_names);

    let song_artists = make_artists(
        &separators.split(&raw_artists),
        &separators.split(&tags.artist_musicbrainz_ids),
        &separators.split(&tags.artist_sort_names),
        naming,
    );
    let album_artists = make_artists(
        &separators.split(&raw_album_artists),
        &separators.split(&tags.album_artist_musicbrainz_ids),
        &separators.split(&tags.album_artist_sort_names),
        naming,
    );
    let artists = if !song_artists.is_empty() {
        song_artists.clone()
    } else if !album_artists.is_empty() {
        album_artists.clone()
    } else {
        vec![unknown_artist()]
    };
    let album_artists = if !album_artists.is_empty() {
        album_artists
    } else if !song_artists.is_empty() {
        song_artists
    } else {
        vec![unknown_artist()]
    };

    let mut genres: Vec<PreGenre> = parse_genres(&tags.genres, separators)
        .into_iter()
        .map(|raw| PreGenre {
            uid: Uid::hashed(MusicType::Genre, |h| h.update_str(Some(raw.as_str()))),
            name: naming.known(&raw, None),
            raw_name: Some(raw),
        })
        .collect();
    if genres.is_empty() {
        genres.push(PreGenre {
            uid: Uid::hashed(MusicType::Genre, |h| h.update_str(None)),
            name: Name::Unknown(Placeholder::Genre),
            raw_name: None,
        });
    }

    let uid_album_artists = if raw_album_artists.is_empty() {
        &raw_artists
    } else {
        &raw_album_artists
    };
    let album_musicbrainz_id = first_value(&tags.album_musicbrainz_id)
        .and_then(|value| Uuid::parse_str(value.trim()).ok());
    let album_uid = match album_musicbrainz_id {
        Some(id) => Uid::musicbrainz(MusicType::Album, id),
        None => Uid::hashed(MusicType::Album, |h| {
            h.update_str(Some(raw_album.as_str()));
            h.update_strs(uid_album_artists);
        }),
    };
    let album = PreAlbum {
        uid: album_uid,
        musicbrainz_id: album_musicbrainz_id,
        name: naming.known(&raw_album, first_value(&tags.album_sort_name).as_deref()),
        raw_name: raw_album.clone(),
        release_type: ReleaseType::parse(&release_types).unwrap_or_default(),
        artists: album_artists,
    };

    let uid = first_value(&tags.musicbrainz_id)
        .and_then(|value| Uid::parse_musicbrainz(MusicType::Song, &value))
        .unwrap_or_else(|| {
            Uid::hashed(MusicType::Song, |h| {
                h.update_str(Some(raw_name.as_str()));
                h.update_str(Some(raw_album.as_str()));
                h.update_date(date.as_ref());
                h.update_u32(track);
                h.update_u32(disc.as_ref().map(|disc| disc.number));
                h.update_strs(&raw_artists);
                h.update_strs(uid_album_artists);
            })
        });

    let replay_gain = ReplayGain {
        track: parse_replay_gain(&tags.replay_gain_track)
            .or_else(|| parse_r128(&tags.r128_track_gain)),
        album: parse_replay_gain(&tags.replay_gain_album)
            .or_else(|| parse_r128(&tags.r128_album_gain)),
    };

    Ok(PreSong {
        uid,
        file: file.clone(),
        name: naming.known(&raw_name, first_value(&tags.sort_name).as_deref()),
        raw_name,
        track,
        disc,
        date,
        duration_ms,
        sample_rate: tags.sample_rate,
        bitrate: tags.bitrate,
        replay_gain,
        has_cover: tags.has_cover,
        album,
        artists,
        genres,
    })
}

fn first_value(values: &[String]) -> Option<String> {
    values
        .iter()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn trimmed(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn make_artists(
    names: &[String],
    ids: &[String],
    sorts: &[String],
    naming: Naming,
) -> Vec<PreArtist> {
    names
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let musicbrainz_id = ids
                .get(index)
                .and_then(|id| Uuid::parse_str(id.trim()).ok());
            let uid = match musicbrainz_id {
                Some(id) => Uid::musicbrainz(MusicType::Artist, id),
                None => Uid::hashed(MusicType::Artist, |h| h.update_str(Some(raw.as_str()))),
            };
            PreArtist {
                uid,
                musicbrainz_id,
                name: naming.known(raw, sorts.get(index).map(String::as_str)),
                raw_name: Some(raw.clone()),
            }
        })
        .collect()
}

fn unknown_artist() -> PreArtist {
    PreArtist {
        uid: Uid::hashed(MusicType::Artist, |h| h.update_str(None)),
        musicbrainz_id: None,
        name: Name::Unknown(Placeholder::Artist),
        raw_name: None,
    }
}

fn parse_genres(values: &[String], separators: &Separators) -> Vec<String> {
    let values = trimmed(values);
    if values.len() == 1 {
        let value = &values[0];
        if let Some(genre) = id3v1_genre(value) {
            return vec![genre.to_string()];
        }
        if let Some(genres) = id3v2_genres(value) {
            return genres;
        }
        return separators.split(&values);
    }
    values
        .into_iter()
        .map(|value| match id3v1_genre(&value) {
            Some(genre) => genre.to_string(),
            None => value,
        })
        .collect()
}

/// Keeps a position when it is positive, or zero with a non-zero total.
fn parse_position(value: Option<&str>, total: Option<&str>) -> Option<u32> {
    let value = value?;
    let mut parts = value.splitn(2, '/');
    let position = parts.next().and_then(|part| part.trim().parse::<u32>().ok());
    let total = parts
        .next()
        .and_then(|part| part.trim().parse::<u32>().ok())
        .or_else(|| total.and_then(|part| part.trim().parse::<u32>().ok()));
    match position {
        Some(position) if position > 0 || total.map(|t| t > 0).unwrap_or(false) => Some(position),
        _ => None,
    }
}

fn parse_replay_gain(values: &[String]) -> Option<f32> {
    let value = first_value(values)?;
    let cleaned: String = value
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == '-')
        .collect();
    cleaned
        .parse::<f32>()
        .ok()
        .filter(|gain| *gain != 0.0 && gain.is_finite())
}

/// R128 gains are Q7.8 fixed point relative to -23 LUFS.
fn parse_r128(values: &[String]) -> Option<f32> {
    let value = first_value(values)?;
    value
        .parse::<f32>()
        .ok()
        .filter(|gain| *gain != 0.0)
        .map(|gain| gain / 256.0 + 5.0)
}

#[cfg(test)]
mod tests {
    use super::{interpret, InterpretError, InterpretSettings, PreSong, Separators};
    use common::{DeviceFile, Naming, Refinement, ReleaseType};
    use metadata::RawTags;
    use std::path::PathBuf;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn device_file(path: &str) -> DeviceFile {
        DeviceFile {
            uri: format!("file://{}", path),
            path: PathBuf::from(path),
            mime_type: "audio/mpeg".to_string(),
            size: 10,
            last_modified_ms: 5,
        }
    }

    fn base_tags() -> RawTags {
        RawTags {
            duration_ms: Some(180_000),
            name: strings(&["Song"]),
            album_name: strings(&["Album"]),
            artist_names: strings(&["Alpha; Beta"]),
            album_artist_names: strings(&["Alpha"]),
            genres: strings(&["Rock; Pop"]),
            track_number: strings(&["3/12"]),
            disc_number: strings(&["1"]),
            year: strings(&["1999"]),
            ..RawTags::default()
        }
    }

    fn interpret_default(path: &str, tags: &RawTags) -> PreSong {
        interpret(&device_file(path), tags, &InterpretSettings::default()).unwrap()
    }

    fn settings(separators: &str, naming: Naming) -> InterpretSettings {
        InterpretSettings {
            separators: Separators::new(separators.chars()),
            naming,
        }
    }

    #[test]
    fn splits_single_values_with_escapes() {
        let separators = Separators::new([';', ',']);
        assert_eq!(
            separators.split(&strings(&["A; B\\;C"])),
            strings(&["A", "B;C"])
        );
        assert_eq!(
            separators.split(&strings(&["A;B", " C "])),
            strings(&["A;B", "C"])
        );
        assert_eq!(
            Separators::default().split(&strings(&["A;B"])),
            strings(&["A;B"])
        );
        assert_eq!(separators.split(&strings(&["Back\\slash"])), strings(&["Back\\slash"]));
    }

    #[test]
    fn parses_core_fields() {
        let song = interpret(
            &device_file("/m/Album/song.mp3"),
            &base_tags(),
            &settings(";", Naming::Intelligent),
        )
        .unwrap();
        assert_eq!(song.raw_name, "Song");
        assert_eq!(song.track, Some(3));
        assert_eq!(song.disc.as_ref().map(|d| d.number), Some(1));
        assert_eq!(song.date.as_ref().map(|d| d.to_string()).as_deref(), Some("1999"));
        let artists: Vec<_> = song.artists.iter().map(|a| a.name.to_string()).collect();
        assert_eq!(artists, vec!["Alpha", "Beta"]);
        let genres: Vec<_> = song.genres.iter().map(|g| g.name.to_string()).collect();
        assert_eq!(genres, vec!["Rock", "Pop"]);
        assert_eq!(song.album.artists.len(), 1);
        assert_eq!(song.album.release_type, ReleaseType::Album(None));
    }

    #[test]
    fn falls_back_to_path_and_placeholders() {
        let tags = RawTags {
            duration_ms: Some(1000),
            ..RawTags::default()
        };
        let song = interpret(
            &device_file("/music/Loose Tracks/07 Untitled.flac"),
            &tags,
            &InterpretSettings::default(),
        )
        .unwrap();
        assert_eq!(song.raw_name, "07 Untitled");
        assert_eq!(song.album.raw_name, "Loose Tracks");
        assert!(song.artists[0].name.is_unknown());
        assert!(song.album.artists[0].name.is_unknown());
        assert!(song.genres[0].name.is_unknown());
        assert_eq!(song.track, None);
        assert_eq!(song.date, None);
    }

    #[test]
    fn album_artists_fall_back_to_track_artists() {
        let mut tags = base_tags();
        tags.album_artist_names.clear();
        let song = interpret(
            &device_file("/m/a.mp3"),
            &tags,
            &settings(";", Naming::Intelligent),
        )
        .unwrap();
        let album_artists: Vec<_> = song.album.artists.iter().map(|a| a.name.to_string()).collect();
        assert_eq!(album_artists, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn rejects_files_without_required_fields() {
        let mut tags = base_tags();
        tags.duration_ms = None;
        assert_eq!(
            interpret(&device_file("/m/a.mp3"), &tags, &InterpretSettings::default()).unwrap_err(),
            InterpretError::MissingDuration
        );

        let mut file = device_file("/m/a.mp3");
        file.mime_type = String::new();
        assert_eq!(
            interpret(&file, &base_tags(), &InterpretSettings::default()).unwrap_err(),
            InterpretError::MissingMimeType
        );

        let mut tags = base_tags();
        tags.album_name.clear();
        assert_eq!(
            interpret(&device_file("/a.mp3"), &tags, &InterpretSettings::default()).unwrap_err(),
            InterpretError::MissingAlbum
        );
    }

    #[test]
    fn uids_ignore_separator_and_naming_settings() {
        let file = device_file("/m/Album/song.mp3");
        let tags = base_tags();
        let a = interpret(&file, &tags, &settings(";", Naming::Intelligent)).unwrap();
        let b = interpret(&file, &tags, &settings("", Naming::Simple)).unwrap();
        let c = interpret(&file, &tags, &settings(";", Naming::Simple)).unwrap();

        assert_eq!(a.uid, b.uid);
        assert_eq!(a.album.uid, b.album.uid);

        assert_eq!(a.uid, c.uid);
        assert_eq!(a.album.uid, c.album.uid);
        let uids = |song: &super::PreSong| {
            (
                song.artists.iter().map(|x| x.uid).collect::<Vec<_>>(),
                song.genres.iter().map(|x| x.uid).collect::<Vec<_>>(),
            )
        };
        assert_eq!(uids(&a), uids(&c));
    }

    #[test]
    fn uid_depends_on_raw_identity() {
        let file = device_file("/m/a.mp3");
        let base = interpret(&file, &base_tags(), &InterpretSettings::default()).unwrap();

        let mut retitled = base_tags();
        retitled.name = strings(&["Other"]);
        let other = interpret(&file, &retitled, &InterpretSettings::default()).unwrap();
        assert_ne!(base.uid, other.uid);
        assert_eq!(base.album.uid, other.album.uid);

        let mut recased = base_tags();
        recased.name = strings(&["SONG"]);
        let same = interpret_default("/elsewhere/b.mp3", &recased);
        assert_eq!(base.uid, same.uid);
    }

    #[test]
    fn musicbrainz_ids_take_precedence() {
        let mut tags = base_tags();
        tags.musicbrainz_id = strings(&["0383dadf-2a4e-4d10-a46a-e9e041da8eb3"]);
        tags.album_musicbrainz_id = strings(&["not-a-uuid"]);
        let song = interpret_default("/m/a.mp3", &tags);
        assert_eq!(
            song.uid.to_string(),
            "org.musicbrainz:a10b-0383dadf-2a4e-4d10-a46a-e9e041da8eb3"
        );
        assert!(song.album.musicbrainz_id.is_none());
    }

    #[test]
    fn compilation_flag_fills_album_artist_and_type() {
        let mut tags = base_tags();
        tags.album_artist_names.clear();
        tags.compilation = strings(&["1"]);
        let song = interpret_default("/m/a.mp3", &tags);
        assert_eq!(song.album.artists[0].name.to_string(), "Various Artists");
        assert_eq!(song.album.release_type, ReleaseType::Compilation(None));

        let mut tags = base_tags();
        tags.release_types = strings(&["album; live"]);
        let song = interpret(&device_file("/m/a.mp3"), &tags, &settings(";", Naming::Intelligent))
            .unwrap();
        assert_eq!(song.album.release_type, ReleaseType::Album(Some(Refinement::Live)));
    }

    #[test]
    fn parses_replay_gain_and_r128() {
        let mut tags = base_tags();
        tags.replay_gain_track = strings(&["-6.50 dB"]);
        tags.replay_gain_album = strings(&["0.00 dB"]);
        tags.r128_album_gain = strings(&["-512"]);
        let song = interpret_default("/m/a.mp3", &tags);
        assert_eq!(song.replay_gain.track, Some(-6.5));
        assert_eq!(song.replay_gain.album, Some(3.0));
    }

    #[test]
    fn expands_id3_genres() {
        let mut tags = base_tags();
        tags.genres = strings(&["(17)Grunge"]);
        let song = interpret_default("/m/a.mp3", &tags);
        let genres: Vec<_> = song.genres.iter().map(|g| g.name.to_string()).collect();
        assert_eq!(genres, vec!["Rock", "Grunge"]);

        tags.genres = strings(&["17", "Jazz"]);
        let song = interpret_default("/m/a.mp3", &tags);
        let genres: Vec<_> = song.genres.iter().map(|g| g.name.to_string()).collect();
        assert_eq!(genres, vec!["Rock", "Jazz"]);
    }

    #[test]
    fn positions_and_dates_degrade_gracefully() {
        let mut tags = base_tags();
        tags.track_number = strings(&["0/0"]);
        tags.disc_number = strings(&["0"]);
        tags.disc_total = strings(&["2"]);
        tags.year = strings(&["not a year"]);
        tags.original_date = strings(&["1987-03"]);
        let song = interpret_default("/m/a.mp3", &tags);
        assert_eq!(song.track, None);
        assert_eq!(song.disc.as_ref().map(|d| d.number), Some(0));
        assert_eq!(song.date.as_ref().map(|d| d.to_string()).as_deref(), Some("1987-03"));

        tags.original_date.clear();
        let song = interpret_default("/m/a.mp3", &tags);
        assert_eq!(song.date, None);
    }
}
