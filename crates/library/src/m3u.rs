use std::fs;
use std::path::{Component, Path, PathBuf};

use common::{path_to_slash_string, Name};
use serde::{Deserialize, Serialize};

use crate::model::{MusicGraph, SongId};

const PLAYLIST_DIRECTIVE: &str = "#PLAYLIST:";

/// Entries of an M3U file with paths resolved against its directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct M3uPlaylist {
    pub name: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Write absolute paths instead of paths relative to the playlist file.
    pub absolute: bool,
    /// Use `\` as the path separator.
    pub windows_paths: bool,
}

/// Returns `None` for files without entries.
pub fn read_m3u(path: &Path) -> Result<Option<M3uPlaylist>, std::io::Error> {
    let bytes = fs::read(path)?;
    let contents = String::from_utf8_lossy(&bytes);
    let playlist = parse_m3u(&contents, path);
    if playlist.paths.is_empty() {
        return Ok(None);
    }
    Ok(Some(playlist))
}

pub fn parse_m3u(contents: &str, playlist_path: &Path) -> M3uPlaylist {
    let base = playlist_path.parent().unwrap_or_else(|| Path::new(""));
    let mut name = None;
    let mut paths = Vec::new();
    for line in contents.lines() {
        let line = line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            continue;
        }
        if let Some(value) = line.strip_prefix(PLAYLIST_DIRECTIVE) {
            let value = value.trim();
            if !value.is_empty() {
                name = Some(value.to_string());
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        paths.push(resolve_entry(base, line));
    }
    M3uPlaylist {
        name: name.unwrap_or_else(|| name_from_file(playlist_path)),
        paths,
    }
}

fn name_from_file(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_entry(base: &Path, entry: &str) -> PathBuf {
    let entry = entry.strip_prefix("file://").unwrap_or(entry).replace('\\', "/");
    let mut resolved = if entry.starts_with('/') {
        PathBuf::from("/")
    } else if is_drive_path(&entry) {
        PathBuf::new()
    } else {
        base.to_path_buf()
    };
    for part in entry.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            part => resolved.push(part),
        }
    }
    resolved
}

fn is_drive_path(entry: &str) -> bool {
    let bytes = entry.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Renders songs as an extended M3U document.
pub fn render_m3u(
    name: &str,
    songs: &[SongId],
    graph: &MusicGraph,
    playlist_dir: &Path,
    config: ExportConfig,
) -> String {
    let mut out = String::from("#EXTM3U\n#EXTENC:UTF-8\n");
    out.push_str(PLAYLIST_DIRECTIVE);
    out.push_str(name);
    out.push('\n');
    for id in songs {
        let song = match graph.song(*id) {
            Some(song) => song,
            None => continue,
        };
        out.push_str(&format!("#EXTINF:{},{}\n", song.duration_ms / 1000, song.name));
        if let Some(album) = graph.album(song.album) {
            out.push_str(&format!("#EXTALB:{}\n", album.name));
        }
        let artists = known_names(
            song.artists
                .iter()
                .filter_map(|id| graph.artist(*id))
                .map(|artist| &artist.name),
        );
        if !artists.is_empty() {
            out.push_str(&format!("#EXTART:{}\n", artists));
        }
        let genres = known_names(
            song.genres
                .iter()
                .filter_map(|id| graph.genre(*id))
                .map(|genre| &genre.name),
        );
        if !genres.is_empty() {
            out.push_str(&format!("#EXTGEN:{}\n", genres));
        }
        let path = if config.absolute {
            song.path.clone()
        } else {
            relative_path(playlist_dir, &song.path)
        };
        let mut line = path_to_slash_string(&path);
        if config.windows_paths {
            line = line.replace('/', "\\");
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn known_names<'a>(names: impl Iterator<Item = &'a Name>) -> String {
    names
        .filter_map(Name::raw)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Path of `target` as seen from the directory `from`.
pub fn relative_path(from: &Path, target: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = target.components().collect();
    let shared = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if shared == 0 && target.is_absolute() {
        return target.to_path_buf();
    }
    let mut out = PathBuf::new();
    for _ in shared..from.len() {
        out.push("..");
    }
    for component in &to[shared..] {
        out.push(component.as_os_str());
    }
    out
}
