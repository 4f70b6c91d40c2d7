use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::StoreError;
use crate::persist::replace_file;

/// Distinguishes temp files written concurrently by this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk form of a single key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub key: String,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

pub struct KvStore {
    dir: PathBuf,
    opened: OnceCell<()>,
    /// Per-key writer locks
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KvStore {
    /// Create a store rooted at `dir`. Nothing touches the disk until first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            opened: OnceCell::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn open(&self) -> Result<(), StoreError> {
        self.opened
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.dir).await?;
                debug!(dir = ?self.dir, "Opened key-value store");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Full record for a key, including when it was last written.
    pub async fn record(&self, key: &str) -> Result<Option<StoreRecord>, StoreError> {
        self.open().await?;
        let bytes = match tokio::fs::read(self.record_path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: StoreRecord = serde_json::from_slice(&bytes).map_err(|source| {
            StoreError::Corrupt {
                key: key.to_string(),
                source,
            }
        })?;
        Ok(Some(record))
    }

    /// Read a key. A key never written is `None`, not an error.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.record(key).await?.map(|r| r.value))
    }

    /// Read a key as `T`. A stored value of a different shape reads as `None`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(value) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(typed) => Ok(Some(typed)),
            Err(e) => {
                debug!(key, error = %e, "Stored value has unexpected shape");
                Ok(None)
            }
        }
    }

    /// Replace the value stored under `key`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.open().await?;

        let record = StoreRecord {
            key: key.to_string(),
            value,
            updated_at: Utc::now(),
        };
        let contents = serde_json::to_vec_pretty(&record).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;

        let path = self.record_path(key);
        let temp = self.dir.join(format!(
            ".{}.{}-{}.tmp",
            urlencoding::encode(key),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        replace_file(&temp, &path, &contents).await?;
        debug!(key, "Stored value");
        Ok(())
    }

    /// Delete a key. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.open().await?;
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        match tokio::fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
