pub mod date;
pub mod name;
pub mod release_type;
pub mod uid;

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub use date::{Date, DateRange};
pub use name::{Name, Naming, Placeholder};
pub use release_type::{Refinement, ReleaseType};
pub use uid::{MusicType, Uid, UidHasher, UidParseError};

/// A file found on disk during exploration.
///
/// Cache identity is `(uri, last_modified_ms)`: the same uri with a different
/// modification time is treated as a different file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceFile {
    pub uri: String,
    pub path: PathBuf,
    pub mime_type: String,
    pub size: u64,
    pub last_modified_ms: u64,
}

impl DeviceFile {
    pub fn cache_key(&self) -> String {
        format!("{}\x1f{}", self.uri, self.last_modified_ms)
    }
}

pub fn file_uri(path: &Path) -> String {
    let slashed = path_to_slash_string(path);
    if slashed.starts_with('/') {
        format!("file://{}", slashed)
    } else {
        format!("file:///{}", slashed)
    }
}

pub fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().trim().to_string())
        .filter(|stem| !stem.is_empty())
}

pub fn parent_dir_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().trim().to_string())
        .filter(|name| !name.is_empty())
}

pub fn path_to_slash_string(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        match component {
            Component::RootDir => out.push('/'),
            Component::Prefix(prefix) => out.push_str(&prefix.as_os_str().to_string_lossy()),
            other => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    out
}
