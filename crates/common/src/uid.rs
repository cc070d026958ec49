use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::date::Date;

const HASHED_NAMESPACE: &str = "phonolite";
const MUSICBRAINZ_NAMESPACE: &str = "org.musicbrainz";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MusicType {
    Song,
    Album,
    Artist,
    Genre,
    Playlist,
}

impl MusicType {
    pub fn code(self) -> u16 {
        match self {
            MusicType::Song => 0xA10B,
            MusicType::Album => 0xA10A,
            MusicType::Artist => 0xA109,
            MusicType::Genre => 0xA108,
            MusicType::Playlist => 0xA107,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0xA10B => Some(MusicType::Song),
            0xA10A => Some(MusicType::Album),
            0xA109 => Some(MusicType::Artist),
            0xA108 => Some(MusicType::Genre),
            0xA107 => Some(MusicType::Playlist),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UidFormat {
    Hashed,
    MusicBrainz,
}

/// Content identity of a song, album, artist, genre or playlist.
///
/// Hashed uids are derived only from raw tag values so that they survive
/// changes to separator and naming settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid {
    format: UidFormat,
    kind: MusicType,
    uuid: Uuid,
}

impl Uid {
    pub fn musicbrainz(kind: MusicType, uuid: Uuid) -> Self {
        Self {
            format: UidFormat::MusicBrainz,
            kind,
            uuid,
        }
    }

    /// Parses a MusicBrainz id tag. Values that are not UUIDs are ignored.
    pub fn parse_musicbrainz(kind: MusicType, value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim())
            .ok()
            .map(|uuid| Self::musicbrainz(kind, uuid))
    }

    pub fn hashed(kind: MusicType, update: impl FnOnce(&mut UidHasher)) -> Self {
        let mut hasher = UidHasher::new();
        update(&mut hasher);
        Self {
            format: UidFormat::Hashed,
            kind,
            uuid: hasher.finish(),
        }
    }

    pub fn random(kind: MusicType) -> Self {
        Self {
            format: UidFormat::Hashed,
            kind,
            uuid: Uuid::new_v4(),
        }
    }

    pub fn kind(&self) -> MusicType {
        self.kind
    }

    pub fn format(&self) -> UidFormat {
        self.format
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let namespace = match self.format {
            UidFormat::Hashed => HASHED_NAMESPACE,
            UidFormat::MusicBrainz => MUSICBRAINZ_NAMESPACE,
        };
        write!(f, "{}:{:04x}-{}", namespace, self.kind.code(), self.uuid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidParseError {
    MissingNamespace,
    UnknownNamespace(String),
    BadType(String),
    BadUuid(String),
}

impl fmt::Display for UidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UidParseError::MissingNamespace => write!(f, "uid has no namespace"),
            UidParseError::UnknownNamespace(value) => write!(f, "unknown uid namespace: {}", value),
            UidParseError::BadType(value) => write!(f, "bad uid type code: {}", value),
            UidParseError::BadUuid(value) => write!(f, "bad uid uuid: {}", value),
        }
    }
}

impl std::error::Error for UidParseError {}

impl FromStr for Uid {
    type Err = UidParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = value
            .split_once(':')
            .ok_or(UidParseError::MissingNamespace)?;
        let format = match namespace {
            HASHED_NAMESPACE => UidFormat::Hashed,
            MUSICBRAINZ_NAMESPACE => UidFormat::MusicBrainz,
            other => return Err(UidParseError::UnknownNamespace(other.to_string())),
        };
        let (code, uuid) = rest
            .split_once('-')
            .ok_or_else(|| UidParseError::BadType(rest.to_string()))?;
        let kind = u16::from_str_radix(code, 16)
            .ok()
            .and_then(MusicType::from_code)
            .ok_or_else(|| UidParseError::BadType(code.to_string()))?;
        let uuid = Uuid::parse_str(uuid).map_err(|_| UidParseError::BadUuid(uuid.to_string()))?;
        Ok(Self { format, kind, uuid })
    }
}

/// Canonical byte feed for hashed uids.
pub struct UidHasher {
    hasher: blake3::Hasher,
}

impl UidHasher {
    fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    pub fn update_str(&mut self, value: Option<&str>) {
        match value {
            Some(value) => {
                self.hasher.update(value.to_lowercase().as_bytes());
                self.hasher.update(&[0x1f]);
            }
            None => {
                self.hasher.update(&[0]);
            }
        }
    }

    pub fn update_strs(&mut self, values: &[String]) {
        for value in values {
            self.update_str(Some(value));
        }
    }

    pub fn update_u32(&mut self, value: Option<u32>) {
        match value {
            Some(value) => {
                self.hasher.update(&value.to_le_bytes());
            }
            None => {
                self.hasher.update(&[0]);
            }
        }
    }

    pub fn update_date(&mut self, value: Option<&Date>) {
        let rendered = value.map(|date| date.to_string());
        self.update_str(rendered.as_deref());
    }

    fn finish(self) -> Uuid {
        let hash = self.hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[..16]);
        Uuid::from_bytes(bytes)
    }
}
