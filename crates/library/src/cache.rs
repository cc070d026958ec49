use std::collections::HashSet;
use std::sync::Arc;

use common::DeviceFile;
use metadata::RawTags;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{clear_table, decode_value, encode_value, LibraryError};

const CACHE_VERSION: u32 = 1;

const TAG_CACHE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tag_cache");
const TAG_CACHE_META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tag_cache_meta");

const META_VERSION_KEY: &str = "version";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Read and write.
    #[default]
    Full,
    /// Always miss, but keep persisting. Forces one full re-extraction.
    WriteOnly,
    /// Neither read nor write.
    Disabled,
}

/// Raw tags persisted per `(uri, mtime)` in the index database.
#[derive(Clone)]
pub struct TagStore {
    db: Arc<Database>,
}

impl TagStore {
    pub fn open(db: Arc<Database>) -> Result<Self, LibraryError> {
        let store = Self { db };
        match store.read_version()? {
            Some(version) if version == CACHE_VERSION => {}
            Some(version) => {
                warn!("Tag cache version mismatch ({}); discarding cache", version);
                store.reset()?;
            }
            None => {
                info!("Tag cache missing; creating");
                store.reset()?;
            }
        }
        Ok(store)
    }

    pub fn get(&self, key: &str) -> Result<Option<RawTags>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TAG_CACHE_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let tags = match table.get(key)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(tags)
    }

    pub fn put(&self, key: &str, tags: &RawTags) -> Result<(), LibraryError> {
        let bytes = encode_value(tags)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TAG_CACHE_TABLE)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Removes every entry whose key is not in `keep`.
    pub fn retain_keys(&self, keep: &HashSet<String>) -> Result<usize, LibraryError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TAG_CACHE_TABLE)?;
            let mut stale = Vec::new();
            for entry in table.iter()? {
                let entry = entry?;
                let key = entry.0.value();
                if !keep.contains(key) {
                    stale.push(key.to_string());
                }
            }
            for key in &stale {
                table.remove(key.as_str())?;
            }
            stale.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TAG_CACHE_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn read_version(&self) -> Result<Option<u32>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TAG_CACHE_META_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let version = match table.get(META_VERSION_KEY)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(version)
    }

    fn reset(&self) -> Result<(), LibraryError> {
        let write_txn = self.db.begin_write()?;
        clear_table(&write_txn, TAG_CACHE_TABLE)?;
        {
            let mut meta = write_txn.open_table(TAG_CACHE_META_TABLE)?;
            let bytes = encode_value(&CACHE_VERSION)?;
            meta.insert(META_VERSION_KEY, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

pub enum CacheResult {
    Hit(DeviceFile, RawTags),
    Miss(DeviceFile),
}

/// Tag cache policy. Store errors are logged and never reach the caller.
#[derive(Clone)]
pub enum Cache {
    Full(TagStore),
    WriteOnly(TagStore),
    Disabled,
}

impl Cache {
    pub fn open(mode: CacheMode, db: Arc<Database>) -> Self {
        if mode == CacheMode::Disabled {
            return Cache::Disabled;
        }
        match TagStore::open(db) {
            Ok(store) if mode == CacheMode::WriteOnly => Cache::WriteOnly(store),
            Ok(store) => Cache::Full(store),
            Err(err) => {
                warn!("Tag cache unavailable: {}", err);
                Cache::Disabled
            }
        }
    }

    pub fn read(&self, file: DeviceFile) -> CacheResult {
        let store = match self {
            Cache::Full(store) => store,
            Cache::WriteOnly(_) | Cache::Disabled => return CacheResult::Miss(file),
        };
        match store.get(&file.cache_key()) {
            Ok(Some(tags)) => CacheResult::Hit(file, tags),
            Ok(None) => CacheResult::Miss(file),
            Err(err) => {
                warn!("Tag cache read failed for {:?}: {}", file.path, err);
                CacheResult::Miss(file)
            }
        }
    }

    pub fn write(&self, file: &DeviceFile, tags: &RawTags) {
        let store = match self {
            Cache::Full(store) | Cache::WriteOnly(store) => store,
            Cache::Disabled => return,
        };
        if let Err(err) = store.put(&file.cache_key(), tags) {
            warn!("Tag cache write failed for {:?}: {}", file.path, err);
        }
    }

    pub fn cleanup(&self, keep: &HashSet<String>) {
        let store = match self {
            Cache::Full(store) | Cache::WriteOnly(store) => store,
            Cache::Disabled => return,
        };
        match store.retain_keys(keep) {
            Ok(0) => {}
            Ok(removed) => info!("Pruned {} stale tag cache entries", removed),
            Err(err) => warn!("Tag cache cleanup failed: {}", err),
        }
    }
}
