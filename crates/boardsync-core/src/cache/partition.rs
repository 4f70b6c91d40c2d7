use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::fetch::{Request, Response};
use crate::format::age_display;
use crate::persist::replace_file;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age_display(&self) -> String {
        age_display(self.cached_at)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionStats {
    pub name: String,
    pub entries: usize,
    pub bytes: u64,
}

/// A single named cache. Clone is cheap and clones share the same directory.
#[derive(Debug, Clone)]
pub struct CachePartition {
    inner: Arc<PartitionInner>,
}

#[derive(Debug)]
struct PartitionInner {
    name: String,
    dir: PathBuf,
}

impl CachePartition {
    pub(crate) async fn open(root: &Path, name: &str) -> Result<Self, CacheError> {
        let dir = root.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(cache = name, "Opened cache partition");
        Ok(Self {
            inner: Arc::new(PartitionInner {
                name: name.to_string(),
                dir,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.inner.dir.join(format!("{}.json", hex::encode(digest)))
    }

    async fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Stored entry for a request, if any.
    pub async fn entry(&self, request: &Request) -> Result<Option<CacheEntry>, CacheError> {
        let key = request.key();
        let entry = Self::read_entry(&self.entry_path(&key)).await?;
        Ok(entry.filter(|e| e.key == key))
    }

    /// Cached response for a request, if any.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        Ok(self.entry(request).await?.map(|e| e.response))
    }

    /// Store a response snapshot, replacing any previous entry for the request.
    pub async fn put(&self, request: &Request, response: &Response) -> Result<(), CacheError> {
        let key = request.key();
        let entry = CacheEntry {
            key: key.clone(),
            response: response.clone(),
            cached_at: Utc::now(),
        };
        let contents = serde_json::to_vec(&entry)?;

        let path = self.entry_path(&key);
        let temp = path.with_extension(format!(
            "{}-{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        replace_file(&temp, &path, &contents).await?;
        debug!(cache = %self.inner.name, key = %key, bytes = response.body.len(), "Cached response");
        Ok(())
    }

    /// Remove the entry for a request. Returns whether one existed.
    pub async fn delete(&self, request: &Request) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(self.entry_path(&request.key())).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All readable entries. Unreadable files are skipped with a warning.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.inner.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!(cache = %self.inner.name, error = %e, "Skipping unreadable cache entry"),
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    pub async fn stats(&self) -> Result<PartitionStats, CacheError> {
        let entries = self.entries().await?;
        Ok(PartitionStats {
            name: self.inner.name.clone(),
            entries: entries.len(),
            bytes: entries.iter().map(|e| e.response.body.len() as u64).sum(),
        })
    }
}
