use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use common::Naming;
use serde::{Deserialize, Serialize};

use crate::cache::CacheMode;
use crate::interpret::{InterpretSettings, Separators};

pub const CONFIG_VERSION: u32 = 1;

const DEFAULT_EXTRACT_WORKERS: usize = 8;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_EXPLORE_CONCURRENCY: usize = 16;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub version: u32,
    pub music_roots: Vec<String>,
    pub index_path: String,
    pub cache_mode: CacheMode,
    pub prune_cache: bool,
    /// Characters that split single-valued multi-value tags. Empty disables splitting.
    pub separators: String,
    pub naming: Naming,
    pub extract_workers: usize,
    pub channel_capacity: usize,
    pub explore_concurrency: usize,
    pub watch: bool,
    pub watch_debounce_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_roots: Vec::new(),
            index_path: "library.redb".to_string(),
            cache_mode: CacheMode::Full,
            prune_cache: true,
            separators: String::new(),
            naming: Naming::Intelligent,
            extract_workers: DEFAULT_EXTRACT_WORKERS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            explore_concurrency: DEFAULT_EXPLORE_CONCURRENCY,
            watch: false,
            watch_debounce_secs: 2,
        }
    }
}

impl IndexerConfig {
    pub fn interpret_settings(&self) -> InterpretSettings {
        InterpretSettings {
            separators: Separators::new(self.separators.chars()),
            naming: self.naming,
        }
    }

    fn normalize(&mut self) {
        if self.version < CONFIG_VERSION {
            self.version = CONFIG_VERSION;
        }
        if self.index_path.trim().is_empty() {
            self.index_path = "library.redb".to_string();
        }
        if self.extract_workers == 0 {
            self.extract_workers = DEFAULT_EXTRACT_WORKERS;
        }
        if self.channel_capacity == 0 {
            self.channel_capacity = DEFAULT_CHANNEL_CAPACITY;
        }
        if self.explore_concurrency == 0 {
            self.explore_concurrency = DEFAULT_EXPLORE_CONCURRENCY;
        }
        if self.watch_debounce_secs == 0 {
            self.watch_debounce_secs = 2;
        }
        self.music_roots.retain(|root| !root.trim().is_empty());
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("PHONOLITE_INDEX_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(IndexerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: IndexerConfig = serde_yaml::from_str(&contents)?;
        config.normalize();
        return Ok((config, false));
    }

    let config = IndexerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &IndexerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

#[cfg(test)]
mod tests {
    use super::{load_or_create_config, resolve_path, save_config, IndexerConfig};
    use crate::cache::CacheMode;
    use common::Naming;
    use std::path::{Path, PathBuf};

    #[test]
    fn creates_default_config_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert!(path.exists());
        assert_eq!(config.extract_workers, 8);
        assert_eq!(config.cache_mode, CacheMode::Full);

        let (_, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
    }

    #[test]
    fn fills_zeroed_values_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            concat!(
                "music_roots: [\"/music\", \" \"]\nextract_workers: 0\n",
                "cache_mode: write_only\nnaming: simple\nseparators: \";/\"\n",
            ),
        )
        .unwrap();
        let (config, _) = load_or_create_config(&path).unwrap();
        assert_eq!(config.music_roots, vec!["/music".to_string()]);
        assert_eq!(config.extract_workers, 8);
        assert_eq!(config.cache_mode, CacheMode::WriteOnly);
        assert_eq!(config.naming, Naming::Simple);
        assert_eq!(config.index_path, "library.redb");
    }

    #[test]
    fn round_trips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = IndexerConfig::default();
        config.music_roots = vec!["songs".to_string()];
        config.cache_mode = CacheMode::Disabled;
        save_config(&path, &config).unwrap();
        let (loaded, _) = load_or_create_config(&path).unwrap();
        assert_eq!(loaded.music_roots, config.music_roots);
        assert_eq!(loaded.cache_mode, CacheMode::Disabled);
    }

    #[test]
    fn resolves_relative_to_config_dir() {
        let config_path = Path::new("/etc/phonolite/config.yaml");
        assert_eq!(
            resolve_path(config_path, "library.redb"),
            PathBuf::from("/etc/phonolite/library.redb")
        );
        assert_eq!(
            resolve_path(config_path, "/var/lib/library.redb"),
            PathBuf::from("/var/lib/library.redb")
        );
    }
}
