//! Persistent metadata cache
//!
//! The last known device and room lists are mirrored to a key-value store so
//! that names and rooms can be resolved right after a restart, before the
//! cloud has answered (or while it is unreachable).
//!
//! The store itself is a narrow interface with two backends:
//! - [`JsonFileStore`]: one pretty-printed JSON file per key
//! - [`MemoryStore`]: a process-local map, used in tests and `--once` runs

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::model::{DeviceMap, RoomMap, Snapshot};

/// Slot holding the combined device/room snapshot
pub const CACHE_KEY: &str = "cloud";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Store error: {0}")]
    Store(String),
}

/// Key-value store for structured values
pub trait CacheStore: Send + Sync {
    /// Load the value stored under `key`, `None` if nothing was saved yet
    fn load(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store `value` under `key`, replacing what was there
    fn save(&self, key: &str, value: &Value) -> Result<(), CacheError>;
}

/// Stores each key as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `base_dir`; the directory is created on first save
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", key))
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.base_dir)?;
        let content = serde_json::to_string_pretty(value)?;
        // Write next to the target and rename so readers never see half a file
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value under `key`, for inspection
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        self.entries.lock().insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// On-disk shape of the cached snapshot
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(default)]
    device_list: Option<DeviceMap>,
    #[serde(default)]
    room_list: Option<RoomMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
}

/// Snapshot persistence bound to a single store slot
#[derive(Clone)]
pub struct MetadataCache {
    store: Arc<dyn CacheStore>,
    key: String,
}

impl MetadataCache {
    /// Cache using the default [`CACHE_KEY`] slot
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_key(store, CACHE_KEY)
    }

    pub fn with_key(store: Arc<dyn CacheStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the last saved snapshot
    ///
    /// Returns `None` when the slot is missing, empty (`{}`), or holds
    /// neither a device list nor a room list.
    pub fn load(&self) -> Result<Option<Snapshot>, CacheError> {
        let value = match self.store.load(&self.key)? {
            Some(Value::Null) | None => return Ok(None),
            Some(value) => value,
        };

        let entry: CacheEntry = serde_json::from_value(value)?;
        let snapshot = Snapshot {
            devices: entry.device_list,
            rooms: entry.room_list,
        };

        if snapshot.is_empty() {
            Ok(None)
        } else {
            Ok(Some(snapshot))
        }
    }

    /// Persist the full snapshot
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        let entry = CacheEntry {
            device_list: snapshot.devices.clone(),
            room_list: snapshot.rooms.clone(),
            saved_at: Some(Utc::now()),
        };
        let value = serde_json::to_value(&entry)?;
        self.store.save(&self.key, &value)
    }

    /// Overwrite the slot with an empty object
    pub fn clear(&self) -> Result<(), CacheError> {
        self.store
            .save(&self.key, &Value::Object(serde_json::Map::new()))
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceRecord, RoomRecord};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_snapshot() -> Snapshot {
        let mut devices = DeviceMap::new();
        devices.insert("dev1".into(), DeviceRecord::new("Lamp", "SHPLG-S", Some("5")));
        devices.insert("dev2_1".into(), DeviceRecord::new("Fan", "SHSW-25", Some("-10")));
        let mut rooms = RoomMap::new();
        rooms.insert("5".into(), RoomRecord::new("Kitchen"));
        Snapshot::new(devices, rooms)
    }

    #[test]
    fn test_memory_round_trip() {
        let cache = MetadataCache::new(Arc::new(MemoryStore::new()));
        assert!(cache.load().unwrap().is_none());

        let snapshot = sample_snapshot();
        cache.save(&snapshot).unwrap();

        assert_eq!(cache.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("cache"));
        let cache = MetadataCache::new(Arc::new(store.clone()));

        let snapshot = sample_snapshot();
        cache.save(&snapshot).unwrap();
        assert!(store.path_for(CACHE_KEY).exists());

        // A fresh cache over the same directory sees the saved data
        let reloaded = MetadataCache::new(Arc::new(JsonFileStore::new(store.base_dir())));
        assert_eq!(reloaded.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_clear_means_no_data() {
        let cache = MetadataCache::new(Arc::new(MemoryStore::new()));
        cache.save(&sample_snapshot()).unwrap();
        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_partial_entry_loads() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(
                CACHE_KEY,
                &json!({ "device_list": { "dev1": { "name": "Lamp", "room_id": 5 } }, "room_list": null }),
            )
            .unwrap();

        let snapshot = MetadataCache::new(store).load().unwrap().unwrap();
        assert_eq!(snapshot.device_count(), 1);
        assert!(snapshot.rooms.is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());
        std::fs::write(store.path_for(CACHE_KEY), "{ not json").unwrap();

        let cache = MetadataCache::new(Arc::new(store));
        assert!(matches!(cache.load(), Err(CacheError::JsonError(_))));
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.save(CACHE_KEY, &json!({ "device_list": [1, 2] })).unwrap();
        assert!(MetadataCache::new(store).load().is_err());
    }
}
