//! Last-known-good payload persistence (SSOT snapshot).
//!
//! A snapshot is written only when the SHA-256 of the payload's canonical JSON
//! differs from the last saved hash. Writes go to a sibling temp file and are
//! renamed into place so a crash never leaves a torn record. Every I/O or decode
//! error is logged and swallowed; callers only see [`SaveOutcome::Failed`] or a
//! missing record.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::{FeedError, UtcDateTime};

/// Persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord<T> {
    pub hash: String,
    pub data: T,
    pub saved_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written { hash: String },
    Unchanged,
    Failed(FeedError),
}

/// Hash-gated snapshot store for one feed.
#[derive(Debug)]
pub struct SsotSnapshot<T> {
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    last: Mutex<Option<SnapshotRecord<T>>>,
    disk: OnceCell<Option<SnapshotRecord<T>>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl<T> SsotSnapshot<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// File-backed snapshot stored at `path`.
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self::with_path(Some(path.into()), clock)
    }

    /// Snapshot that lives only as long as the process.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::with_path(None, clock)
    }

    fn with_path(path: Option<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path,
            clock,
            last: Mutex::new(None),
            disk: OnceCell::new(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn save(&self, data: &T) -> SaveOutcome {
        let _write = self.write_lock.lock().await;

        let hash = match payload_hash(data) {
            Ok(hash) => hash,
            Err(error) => {
                warn!(error = %error, "snapshot payload could not be hashed");
                return SaveOutcome::Failed(error);
            }
        };

        if self.load().await.is_some_and(|record| record.hash == hash) {
            debug!(hash = %hash, "snapshot unchanged, skipping write");
            return SaveOutcome::Unchanged;
        }

        let record = SnapshotRecord {
            hash: hash.clone(),
            data: data.clone(),
            saved_at: self.clock.now(),
        };

        if let Some(path) = &self.path {
            if let Err(error) = write_atomically(path, &record).await {
                warn!(path = %path.display(), error = %error, "snapshot write failed");
                return SaveOutcome::Failed(error);
            }
        }

        *self.last.lock().expect("snapshot memo lock is not poisoned") = Some(record);
        SaveOutcome::Written { hash }
    }

    /// Returns the last saved record. The file is read at most once; concurrent
    /// first calls wait on that read and later calls are served from memory.
    pub async fn load(&self) -> Option<SnapshotRecord<T>> {
        if let Some(record) = self.memoized() {
            return Some(record);
        }

        let Some(path) = &self.path else {
            return None;
        };
        let from_disk = self
            .disk
            .get_or_init(|| async {
                match read_record::<T>(path).await {
                    Ok(record) => record,
                    Err(error) => {
                        warn!(path = %path.display(), error = %error, "snapshot could not be loaded");
                        None
                    }
                }
            })
            .await;

        let mut last = self.last.lock().expect("snapshot memo lock is not poisoned");
        if last.is_none() {
            last.clone_from(from_disk);
        }
        last.clone()
    }

    fn memoized(&self) -> Option<SnapshotRecord<T>> {
        self.last
            .lock()
            .expect("snapshot memo lock is not poisoned")
            .clone()
    }
}

/// Lower-case hex SHA-256 of the value's compact JSON encoding.
pub fn payload_hash<T: Serialize>(data: &T) -> Result<String, FeedError> {
    let canonical = serde_json::to_vec(data).map_err(|error| FeedError::SnapshotIo {
        message: format!("failed to encode snapshot payload: {error}"),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

async fn write_atomically<T: Serialize>(
    path: &Path,
    record: &SnapshotRecord<T>,
) -> Result<(), FeedError> {
    let bytes = serde_json::to_vec_pretty(record).map_err(|error| FeedError::SnapshotIo {
        message: format!("failed to encode snapshot: {error}"),
    })?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| io_error("create snapshot directory", parent, error))?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    tokio::fs::write(&temp, bytes)
        .await
        .map_err(|error| io_error("write snapshot temp file", &temp, error))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|error| io_error("rename snapshot into place", path, error))
}

async fn read_record<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<SnapshotRecord<T>>, FeedError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(io_error("read snapshot", path, error)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|error| FeedError::SnapshotIo {
            message: format!("failed to decode snapshot '{}': {error}", path.display()),
        })
}

fn io_error(action: &str, path: &Path, error: std::io::Error) -> FeedError {
    FeedError::SnapshotIo {
        message: format!("{action} '{}': {error}", path.display()),
    }
}
