//! File-backed fingerprint index, atomic JSON writes and keyed write locks.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ctrlscroll_core::FingerprintEntry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "ctrlscroll-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error on {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The persisted SimHash index: a JSON array rewritten in full on every save.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/index/simhash.json`
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("index").join("simhash.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the index. A missing, unreadable or malformed file is an empty
    /// index; malformed entries and repeated ids are skipped.
    pub async fn load(&self) -> Vec<FingerprintEntry> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => parse_index(&text, &self.path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no fingerprint index yet");
                Vec::new()
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "unreadable fingerprint index, starting empty");
                Vec::new()
            }
        }
    }

    pub async fn save(&self, entries: &[FingerprintEntry]) -> Result<(), StoreError> {
        write_json_atomic(&self.path, entries).await?;
        debug!(path = %self.path.display(), entries = entries.len(), "fingerprint index saved");
        Ok(())
    }
}

fn parse_index(text: &str, path: &Path) -> Vec<FingerprintEntry> {
    let items = match serde_json::from_str::<JsonValue>(text) {
        Ok(JsonValue::Array(items)) => items,
        Ok(_) => {
            warn!(path = %path.display(), "fingerprint index is not a JSON array, starting empty");
            return Vec::new();
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "malformed fingerprint index, starting empty");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<FingerprintEntry>(item) {
            Ok(entry) if seen.insert(entry.id.clone()) => entries.push(entry),
            Ok(entry) => {
                warn!(position, id = %entry.id, "repeated id in fingerprint index, keeping first");
            }
            Err(err) => {
                warn!(position, error = %err, "skipping malformed fingerprint entry");
            }
        }
    }
    entries
}

/// Serializes `value` as pretty JSON and atomically replaces `path` with it.
pub async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(path, e))?;
    write_atomic(path, &bytes).await
}

/// Writes through a temp file in the target directory, then renames over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .map_err(|e| StoreError::io(&parent, e))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .map_err(|e| StoreError::io(&temp_path, e))?;
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;
    drop(file);
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StoreError::io(&temp_path, err));
    }

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StoreError::io(path, err));
    }
    Ok(())
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| StoreError::json(path, e))
}

/// Like [`read_json`], but a missing or malformed file yields `T::default()`.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path).await {
        Ok(value) => value,
        Err(StoreError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            T::default()
        }
        Err(err) => {
            warn!(error = %err, "using defaults");
            T::default()
        }
    }
}

/// One async mutex per resource key, created on first use and kept for the
/// lifetime of the owner.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub async fn lock_path(&self, path: &Path) -> OwnedMutexGuard<()> {
        self.lock(&path.to_string_lossy()).await
    }
}
