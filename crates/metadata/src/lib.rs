use std::path::Path;

use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use lofty::tag::Tag;
use serde::{Deserialize, Serialize};

/// Tag values as the decoder found them.
///
/// Text fields stay unparsed. A field may hold several values, or a single
/// value that still contains separator characters.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTags {
    pub duration_ms: Option<u64>,
    pub sample_rate: Option<u32>,
    pub bitrate: Option<u32>,
    pub channels: Option<u8>,
    pub has_cover: bool,

    pub musicbrainz_id: Vec<String>,
    pub name: Vec<String>,
    pub sort_name: Vec<String>,
    pub track_number: Vec<String>,
    pub track_total: Vec<String>,
    pub disc_number: Vec<String>,
    pub disc_total: Vec<String>,
    pub disc_subtitle: Vec<String>,
    pub recording_date: Vec<String>,
    pub year: Vec<String>,
    pub original_date: Vec<String>,

    pub album_musicbrainz_id: Vec<String>,
    pub album_name: Vec<String>,
    pub album_sort_name: Vec<String>,
    pub release_types: Vec<String>,

    pub artist_musicbrainz_ids: Vec<String>,
    pub artist_names: Vec<String>,
    pub artist_sort_names: Vec<String>,
    pub album_artist_musicbrainz_ids: Vec<String>,
    pub album_artist_names: Vec<String>,
    pub album_artist_sort_names: Vec<String>,

    pub genres: Vec<String>,

    pub replay_gain_track: Vec<String>,
    pub replay_gain_album: Vec<String>,
    pub r128_track_gain: Vec<String>,
    pub r128_album_gain: Vec<String>,

    pub compilation: Vec<String>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub fn read_raw_tags(path: &Path) -> Result<RawTags, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut tags = RawTags::default();

    let duration_ms = properties.duration().as_millis();
    if duration_ms > 0 {
        tags.duration_ms = Some(duration_ms.min(u128::from(u64::MAX)) as u64);
    }
    tags.sample_rate = properties.sample_rate();
    tags.channels = properties.channels();
    tags.bitrate = properties.audio_bitrate().or(properties.overall_bitrate());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        fill_from_tag(&mut tags, tag);
    }

    Ok(tags)
}

fn fill_from_tag(tags: &mut RawTags, tag: &Tag) {
    tags.has_cover = !tag.pictures().is_empty();

    // Release track id only. A recording id is shared by every release
    // the recording appears on.
    tags.musicbrainz_id = strings(tag, &ItemKey::MusicBrainzTrackId);
    tags.name = strings(tag, &ItemKey::TrackTitle);
    tags.sort_name = strings(tag, &ItemKey::TrackTitleSortOrder);
    tags.track_number = strings(tag, &ItemKey::TrackNumber);
    tags.track_total = strings(tag, &ItemKey::TrackTotal);
    tags.disc_number = strings(tag, &ItemKey::DiscNumber);
    tags.disc_total = strings(tag, &ItemKey::DiscTotal);
    tags.disc_subtitle = strings(tag, &ItemKey::SetSubtitle);
    tags.recording_date = strings(tag, &ItemKey::RecordingDate);
    tags.year = strings(tag, &ItemKey::Year);
    tags.original_date = strings(tag, &ItemKey::OriginalReleaseDate);

    tags.album_musicbrainz_id = strings(tag, &ItemKey::MusicBrainzReleaseId);
    tags.album_name = strings(tag, &ItemKey::AlbumTitle);
    tags.album_sort_name = strings(tag, &ItemKey::AlbumTitleSortOrder);
    tags.release_types = first_present(
        tag,
        &[
            ItemKey::Unknown("RELEASETYPE".to_string()),
            ItemKey::Unknown("MUSICBRAINZ_ALBUMTYPE".to_string()),
        ],
    );

    tags.artist_musicbrainz_ids = strings(tag, &ItemKey::MusicBrainzArtistId);
    tags.artist_names = strings(tag, &ItemKey::TrackArtist);
    tags.artist_sort_names = strings(tag, &ItemKey::TrackArtistSortOrder);
    tags.album_artist_musicbrainz_ids = strings(tag, &ItemKey::MusicBrainzReleaseArtistId);
    tags.album_artist_names = strings(tag, &ItemKey::AlbumArtist);
    tags.album_artist_sort_names = strings(tag, &ItemKey::AlbumArtistSortOrder);

    tags.genres = strings(tag, &ItemKey::Genre);

    tags.replay_gain_track = strings(tag, &ItemKey::ReplayGainTrackGain);
    tags.replay_gain_album = strings(tag, &ItemKey::ReplayGainAlbumGain);
    tags.r128_track_gain = strings(tag, &ItemKey::Unknown("R128_TRACK_GAIN".to_string()));
    tags.r128_album_gain = strings(tag, &ItemKey::Unknown("R128_ALBUM_GAIN".to_string()));

    tags.compilation = strings(tag, &ItemKey::FlagCompilation);
}

fn strings(tag: &Tag, key: &ItemKey) -> Vec<String> {
    tag.get_strings(key)
        .map(|value| value.trim_matches('\0').to_string())
        .filter(|value| !value.trim().is_empty())
        .collect()
}

fn first_present(tag: &Tag, keys: &[ItemKey]) -> Vec<String> {
    for key in keys {
        let values = strings(tag, key);
        if !values.is_empty() {
            return values;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::{fill_from_tag, read_raw_tags, MetadataError, RawTags};
    use lofty::prelude::ItemKey;
    use lofty::tag::{Tag, TagType};
    use std::io::Write;

    const RECORDING: &str = "0383dadf-2a4e-4d10-a46a-e9e041da8eb3";
    const RELEASE_TRACK: &str = "9c5f1e3b-6b4a-4f0e-8a55-1d2c7f4b9e10";

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_raw_tags(&dir.path().join("missing.mp3")).unwrap_err();
        assert!(matches!(err, MetadataError::Io(_) | MetadataError::Lofty(_)));
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.flac");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"definitely not audio").unwrap();
        assert!(read_raw_tags(&path).is_err());
    }

    #[test]
    fn raw_tags_default_to_empty() {
        let tags = RawTags::default();
        assert!(tags.name.is_empty());
        assert!(tags.duration_ms.is_none());
        assert!(!tags.has_cover);
    }

    #[test]
    fn recording_id_is_not_a_song_id() {
        let mut tag = Tag::new(TagType::VorbisComments);
        assert!(tag.insert_text(ItemKey::MusicBrainzRecordingId, RECORDING.to_string()));
        let mut tags = RawTags::default();
        fill_from_tag(&mut tags, &tag);
        assert!(tags.musicbrainz_id.is_empty());

        assert!(tag.insert_text(ItemKey::MusicBrainzTrackId, RELEASE_TRACK.to_string()));
        let mut tags = RawTags::default();
        fill_from_tag(&mut tags, &tag);
        assert_eq!(tags.musicbrainz_id, vec![RELEASE_TRACK.to_string()]);
    }
}
