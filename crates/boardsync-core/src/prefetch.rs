//! Warm the dynamic cache with every icon a dataset references.
//!
//! Each unique resolved URL is fetched at most once per run. Fetches are
//! independent: one failing icon never stops the others, and nothing is
//! retried.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::cache::CachePartition;
use crate::fetch::{Fetcher, Method, Request};
use crate::models::Dataset;

/// Default number of icon fetches in flight at once.
pub const DEFAULT_PREFETCH_CONCURRENCY: usize = 6;

/// Resolve an icon path against an optional base URL.
///
/// Absolute `http(s)://` paths pass through unchanged. Relative paths are
/// joined to `base` with exactly one slash between them. An empty base
/// leaves the path as-is; an empty path resolves to an empty string.
pub fn normalize_icon_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    if is_absolute_http(path) {
        return path.to_string();
    }
    if !base.is_empty() {
        return format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
    }
    path.to_string()
}

fn is_absolute_http(path: &str) -> bool {
    let lower = path
        .get(..8)
        .map(|p| p.to_ascii_lowercase())
        .unwrap_or_else(|| path.to_ascii_lowercase());
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Unique icon URLs for a dataset, in first-seen order.
pub fn icon_urls(dataset: &Dataset, base: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    dataset
        .items
        .iter()
        .filter_map(|item| item.icon())
        .map(|path| normalize_icon_url(base, path))
        .filter(|url| !url.is_empty())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Per-URL outcome of a prefetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub fetched: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl PrefetchReport {
    pub fn total(&self) -> usize {
        self.fetched.len() + self.failed.len()
    }
}

pub struct IconPrefetcher {
    network: Arc<dyn Fetcher>,
    cache: CachePartition,
    origin: Url,
    concurrency: usize,
}

impl IconPrefetcher {
    /// `origin` resolves icon paths that are still relative after
    /// normalization (no base URL configured).
    pub fn new(network: Arc<dyn Fetcher>, cache: CachePartition, origin: Url) -> Self {
        Self {
            network,
            cache,
            origin,
            concurrency: DEFAULT_PREFETCH_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn prefetch(&self, dataset: &Dataset, base_url: &str) -> PrefetchReport {
        let urls = icon_urls(dataset, base_url);
        debug!(unique = urls.len(), items = dataset.items.len(), "Prefetching icons");

        let results: Vec<(String, Result<(), String>)> = stream::iter(urls)
            .map(|url| async move {
                let result = self.fetch_one(&url).await;
                (url, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = PrefetchReport::default();
        for (url, result) in results {
            match result {
                Ok(()) => report.fetched.push(url),
                Err(reason) => {
                    debug!(url = %url, reason = %reason, "Icon prefetch failed");
                    report.failed.push((url, reason));
                }
            }
        }
        report.fetched.sort();
        report.failed.sort();

        if report.failed.is_empty() {
            info!(fetched = report.fetched.len(), "Icon prefetch complete");
        } else {
            warn!(
                fetched = report.fetched.len(),
                failed = report.failed.len(),
                "Icon prefetch complete with failures"
            );
        }
        report
    }

    async fn fetch_one(&self, url: &str) -> Result<(), String> {
        let resolved = self.origin.join(url).map_err(|e| format!("invalid URL: {}", e))?;
        let request = Request::new(Method::GET, resolved).no_store();
        let response = self
            .network
            .fetch(request.clone())
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("HTTP {}", response.status));
        }
        self.cache
            .put(&request, &response)
            .await
            .map_err(|e| e.to_string())
    }
}
