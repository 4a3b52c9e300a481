// src/state.rs

use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StorageError;

/// Durable string blobs under string keys, written through immediately.
///
/// This is the only thing the flow storage needs from its environment, so
/// the same flows can live in memory, in a directory or anywhere else.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
         .field("impl", &self.name())
         .finish()
    }
}

/// Process-local store; optionally enforces a byte quota over all values the
/// way browser storage does.
#[derive(Debug, Default)]
pub struct InMemoryState {
    store: DashMap<String, String>,
    quota: Option<usize>,
}

impl InMemoryState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_quota(bytes: usize) -> Arc<Self> {
        Arc::new(Self { store: DashMap::new(), quota: Some(bytes) })
    }

    fn used_without(&self, key: &str) -> usize {
        self.store
            .iter()
            .filter(|entry| entry.key() != key)
            .map(|entry| entry.key().len() + entry.value().len())
            .sum()
    }
}

impl StateStore for InMemoryState {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.store.get(key).map(|v| v.clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(limit) = self.quota {
            let size = self.used_without(key) + key.len() + value.len();
            if size > limit {
                return Err(StorageError::QuotaExceeded { key: key.to_string(), size, limit });
            }
        }
        self.store.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.store.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "InMemoryStateStore"
    }
}

/// One file per key inside `dir`. Values are replaced atomically: the new
/// content is written to a temp file in the same directory and renamed over
/// the old one, so readers never see a half-written record set.
#[derive(Debug, Clone)]
pub struct FileState {
    dir: PathBuf,
}

impl FileState {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Arc<Self>, StorageError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!("Created flow storage directory {}", dir.display());
        }
        Ok(Arc::new(Self { dir }))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::Unavailable(format!("invalid storage key `{key}`")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl StateStore for FileState {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error.to_string()))?;
        debug!(key, bytes = value.len(), "wrote {}", path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "FileStateStore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_state_store() {
        let store = InMemoryState::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v2".to_string()));

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.name(), "InMemoryStateStore");
    }

    #[test]
    fn test_in_memory_quota_rejects_without_applying() {
        let store = InMemoryState::with_quota(10);
        store.set("a", "12345").unwrap();

        let err = store.set("b", "123456").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { limit: 10, .. }));
        assert_eq!(store.get("b").unwrap(), None);

        // replacing a value only counts the new size
        store.set("a", "123456789").unwrap();
    }

    #[test]
    fn test_state_store_trait_object_usage() {
        let store: Arc<dyn StateStore> = InMemoryState::new();
        store.set("x", "3.14").unwrap();
        assert_eq!(store.get("x").unwrap().as_deref(), Some("3.14"));
        assert!(format!("{:?}", store).contains("InMemoryStateStore"));
    }

    #[test]
    fn test_file_state_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = FileState::new(tmp.path().join("nested")).unwrap();

        assert_eq!(store.get("chatbot_flows").unwrap(), None);
        store.set("chatbot_flows", "[]").unwrap();
        assert_eq!(store.get("chatbot_flows").unwrap(), Some("[]".to_string()));
        assert!(store.dir().join("chatbot_flows.json").exists());

        store.remove("chatbot_flows").unwrap();
        store.remove("chatbot_flows").unwrap();
        assert_eq!(store.get("chatbot_flows").unwrap(), None);
    }

    #[test]
    fn test_file_state_rejects_path_like_keys() {
        let tmp = TempDir::new().unwrap();
        let store = FileState::new(tmp.path()).unwrap();
        assert!(store.set("../escape", "x").is_err());
        assert!(store.get("").is_err());
    }
}
