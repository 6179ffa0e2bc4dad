//! Durable per-namespace snapshots of a store's cache, queue and metadata.

use crate::cache::LocalCache;
use crate::meta::SyncMetadata;
use crate::queue::PendingQueue;
use directories::BaseDirs;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current on-disk snapshot layout.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

const DEFAULT_STATE_DIR: &str = ".focusync";

/// Everything a store needs to resume after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot<R, M> {
    pub schema_version: u32,
    pub meta: SyncMetadata,
    pub cache: LocalCache<R>,
    pub pending: PendingQueue<M>,
}

/// Errors returned by snapshot stores.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
}

/// Key/value persistence for store snapshots, keyed by namespace.
pub trait SnapshotStore: Send + Sync {
    /// Load the raw snapshot for a namespace, if any.
    fn load(&self, namespace: &str) -> Result<Option<Value>, SnapshotError>;
    /// Replace the snapshot for a namespace.
    fn save(&self, namespace: &str, snapshot: &Value) -> Result<(), SnapshotError>;
    /// Delete the snapshot for a namespace, returning whether one existed.
    fn remove(&self, namespace: &str) -> Result<bool, SnapshotError>;
}

/// Snapshot store writing one JSON file per namespace.
pub struct JsonFileSnapshotStore {
    root: PathBuf,
    /// Serialize writers so temp files never interleave.
    write_lock: Mutex<()>,
}

impl JsonFileSnapshotStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!("initialized snapshot store (root={})", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Store rooted at `~/.focusync/state`, falling back to the working directory.
    pub fn open_default() -> Result<Self, SnapshotError> {
        Self::new(default_state_root()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, namespace: &str) -> Result<PathBuf, SnapshotError> {
        validate_namespace(namespace)?;
        Ok(self.root.join(format!("{namespace}.json")))
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn load(&self, namespace: &str) -> Result<Option<Value>, SnapshotError> {
        let path = self.snapshot_path(namespace)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SnapshotError::Io(err)),
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(
                    "malformed snapshot ignored (path={}): {err}",
                    path.display()
                );
                Ok(None)
            }
        }
    }

    fn save(&self, namespace: &str, snapshot: &Value) -> Result<(), SnapshotError> {
        let path = self.snapshot_path(namespace)?;
        let temp_path = self.root.join(format!("{namespace}.json.tmp"));
        let _guard = self.write_lock.lock();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            let body = serde_json::to_vec(snapshot)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        debug!("snapshot written (namespace={namespace})");
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<bool, SnapshotError> {
        let path = self.snapshot_path(namespace)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(SnapshotError::Io(err)),
        }
    }
}

/// Process-local snapshot store.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, namespace: &str) -> Result<Option<Value>, SnapshotError> {
        Ok(self.entries.lock().get(namespace).cloned())
    }

    fn save(&self, namespace: &str, snapshot: &Value) -> Result<(), SnapshotError> {
        self.entries
            .lock()
            .insert(namespace.to_string(), snapshot.clone());
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<bool, SnapshotError> {
        Ok(self.entries.lock().remove(namespace).is_some())
    }
}

fn validate_namespace(namespace: &str) -> Result<(), SnapshotError> {
    let valid = !namespace.is_empty()
        && namespace
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(SnapshotError::InvalidNamespace(namespace.to_string()))
    }
}

fn default_state_root() -> Result<PathBuf, SnapshotError> {
    if let Some(home) = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
        return Ok(home.join(DEFAULT_STATE_DIR).join("state"));
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(DEFAULT_STATE_DIR).join("state"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn file_store_round_trips_and_removes() {
        let temp = tempdir().expect("tempdir");
        let store = JsonFileSnapshotStore::new(temp.path()).expect("store");
        assert_eq!(store.load("goals").expect("load"), None);

        store
            .save("goals", &json!({ "schema_version": 1 }))
            .expect("save");
        assert_eq!(
            store.load("goals").expect("load"),
            Some(json!({ "schema_version": 1 }))
        );
        assert!(!temp.path().join("goals.json.tmp").exists());

        assert!(store.remove("goals").expect("remove"));
        assert!(!store.remove("goals").expect("remove again"));
    }

    #[test]
    fn malformed_file_loads_as_absent() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("chat.json"), "{not json").expect("write");
        let store = JsonFileSnapshotStore::new(temp.path()).expect("store");
        assert_eq!(store.load("chat").expect("load"), None);
    }

    #[test]
    fn rejects_path_like_namespaces() {
        let temp = tempdir().expect("tempdir");
        let store = JsonFileSnapshotStore::new(temp.path()).expect("store");
        let err = store.save("../escape", &json!({})).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidNamespace(_)));
    }
}
