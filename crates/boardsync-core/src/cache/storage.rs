use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use super::partition::{CachePartition, PartitionStats};
use super::STATIC_CACHE;
use crate::error::CacheError;
use crate::fetch::{Request, Response};

/// The set of named partitions under one root directory.
/// Clone is cheap; clones share the opened partitions.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    root: PathBuf,
    opened: Arc<Mutex<Vec<CachePartition>>>,
}

impl CacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open a partition, creating it if needed. Reopening returns the same partition.
    pub async fn open(&self, name: &str) -> Result<CachePartition, CacheError> {
        let mut opened = self.opened.lock().await;
        if let Some(existing) = opened.iter().find(|p| p.name() == name) {
            return Ok(existing.clone());
        }
        let partition = CachePartition::open(&self.root, name).await?;
        opened.push(partition.clone());
        Ok(partition)
    }

    /// Look a request up in every opened partition. The static shell is
    /// checked first; the rest follow in the order they were opened.
    /// Unreadable entries count as misses.
    pub async fn match_any(&self, request: &Request) -> Option<Response> {
        let mut partitions = self.opened.lock().await.clone();
        partitions.sort_by_key(|p| p.name() != STATIC_CACHE);
        for partition in partitions {
            match partition.match_request(request).await {
                Ok(Some(response)) => return Some(response),
                Ok(None) => {}
                Err(e) => {
                    warn!(cache = partition.name(), error = %e, "Cache lookup failed, treating as miss");
                }
            }
        }
        None
    }

    /// Names of every partition present on disk.
    pub async fn names(&self) -> Result<Vec<String>, CacheError> {
        let mut names = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_dir() {
                names.push(item.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Size report for every partition on disk.
    pub async fn stats(&self) -> Result<Vec<PartitionStats>, CacheError> {
        let mut stats = Vec::new();
        for name in self.names().await? {
            stats.push(self.open(&name).await?.stats().await?);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DYNAMIC_CACHE, STATIC_CACHE};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_match_any_prefers_static_whatever_the_open_order() {
        let dir = TempDir::new().unwrap();
        let caches = CacheStorage::new(dir.path());
        let dynamic = caches.open(DYNAMIC_CACHE).await.unwrap();
        let other = caches.open("board-extra").await.unwrap();
        let shell = caches.open(STATIC_CACHE).await.unwrap();

        let req = Request::get("https://board.example/app.js").unwrap();
        other.put(&req, &Response::new(req.url.as_str(), 200, b"extra".to_vec())).await.unwrap();
        dynamic.put(&req, &Response::new(req.url.as_str(), 200, b"dynamic".to_vec())).await.unwrap();
        assert_eq!(caches.match_any(&req).await.unwrap().body, b"dynamic");

        shell.put(&req, &Response::new(req.url.as_str(), 200, b"static".to_vec())).await.unwrap();
        assert_eq!(caches.match_any(&req).await.unwrap().body, b"static");
    }

    #[tokio::test]
    async fn test_stats_does_not_change_lookup_priority() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(DYNAMIC_CACHE)).unwrap();
        std::fs::create_dir_all(dir.path().join(STATIC_CACHE)).unwrap();
        let caches = CacheStorage::new(dir.path());
        caches.stats().await.unwrap();

        let req = Request::get("https://board.example/index.html").unwrap();
        let dynamic = caches.open(DYNAMIC_CACHE).await.unwrap();
        let shell = caches.open(STATIC_CACHE).await.unwrap();
        dynamic.put(&req, &Response::new(req.url.as_str(), 200, b"dynamic".to_vec())).await.unwrap();
        shell.put(&req, &Response::new(req.url.as_str(), 200, b"static".to_vec())).await.unwrap();
        assert_eq!(caches.match_any(&req).await.unwrap().body, b"static");
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let caches = CacheStorage::new(dir.path());
        caches.open(DYNAMIC_CACHE).await.unwrap();
        caches.open(DYNAMIC_CACHE).await.unwrap();
        assert_eq!(caches.names().await.unwrap(), vec![DYNAMIC_CACHE.to_string()]);
    }

    #[tokio::test]
    async fn test_names_on_missing_root() {
        let dir = TempDir::new().unwrap();
        let caches = CacheStorage::new(dir.path().join("nothing-yet"));
        assert!(caches.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_covers_all_partitions() {
        let dir = TempDir::new().unwrap();
        let caches = CacheStorage::new(dir.path());
        let dynamic = caches.open(DYNAMIC_CACHE).await.unwrap();
        caches.open(STATIC_CACHE).await.unwrap();
        let req = Request::get("https://cdn.example/i.png").unwrap();
        dynamic.put(&req, &Response::new(req.url.as_str(), 200, vec![1, 2, 3])).await.unwrap();

        let stats = caches.stats().await.unwrap();
        assert_eq!(stats.len(), 2);
        let dynamic_stats = stats.iter().find(|s| s.name == DYNAMIC_CACHE).unwrap();
        assert_eq!(dynamic_stats.entries, 1);
        assert_eq!(dynamic_stats.bytes, 3);
    }
}
