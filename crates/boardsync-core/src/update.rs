//! Remote dataset updates.
//!
//! A check fetches a candidate dataset, compares it with the current one and,
//! if it supersedes it, commits it to the store and warms the icon cache.
//! The commit always happens before the prefetch, and the prefetch always
//! finishes before `Applied` is returned.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::UpdateError;
use crate::fetch::{Fetcher, Request};
use crate::loader::DatasetLoader;
use crate::models::Dataset;
use crate::prefetch::{IconPrefetcher, PrefetchReport};
use crate::store::{keys, KvStore};

/// Result of an update check. Each variant is reported differently to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UpdateOutcome {
    /// No remote URL has been configured.
    NotConfigured,
    /// The remote dataset does not supersede the current one.
    #[serde(rename_all = "camelCase")]
    NoUpdate { current_version: i64 },
    /// A new dataset was committed; the presentation layer must reload.
    #[serde(rename_all = "camelCase")]
    Applied {
        version: i64,
        exported_at: String,
        icons_fetched: usize,
        icons_failed: usize,
    },
    /// The check could not complete. Nothing was committed.
    Failed { message: String },
}

impl UpdateOutcome {
    pub fn requires_reload(&self) -> bool {
        matches!(self, UpdateOutcome::Applied { .. })
    }
}

/// Whether `candidate` supersedes `current`.
///
/// Version is compared first. On a version tie, a non-empty candidate
/// timestamp that differs from the current one also counts, which catches
/// a dataset republished without bumping its version.
pub fn should_update(current: &Dataset, candidate: &Dataset) -> bool {
    candidate.version > current.version
        || (candidate.version == current.version
            && !candidate.exported_at.is_empty()
            && candidate.exported_at != current.exported_at)
}

pub struct UpdateCoordinator {
    network: Arc<dyn Fetcher>,
    store: Arc<KvStore>,
    loader: DatasetLoader,
    prefetcher: IconPrefetcher,
}

impl UpdateCoordinator {
    /// `network` must reach the remote endpoint directly, without any
    /// caching layer in between.
    pub fn new(
        network: Arc<dyn Fetcher>,
        store: Arc<KvStore>,
        loader: DatasetLoader,
        prefetcher: IconPrefetcher,
    ) -> Self {
        Self {
            network,
            store,
            loader,
            prefetcher,
        }
    }

    /// Check the endpoint and base URL saved in the store.
    pub async fn check_configured(&self) -> UpdateOutcome {
        let url = self.read_setting(keys::UPDATES_URL).await;
        if url.is_empty() {
            return UpdateOutcome::NotConfigured;
        }
        let base_url = self.read_setting(keys::UPDATES_BASE_URL).await;
        self.check_for_update(&url, &base_url).await
    }

    async fn read_setting(&self, key: &str) -> String {
        match self.store.get_as::<String>(key).await {
            Ok(value) => value.unwrap_or_default().trim().to_string(),
            Err(e) => {
                warn!(key, error = %e, "Could not read update setting");
                String::new()
            }
        }
    }

    pub async fn check_for_update(&self, remote_url: &str, base_url: &str) -> UpdateOutcome {
        match self.try_check(remote_url, base_url).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(url = remote_url, error = %e, "Update check failed");
                UpdateOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn try_check(&self, remote_url: &str, base_url: &str) -> Result<UpdateOutcome, UpdateError> {
        let candidate = self.fetch_candidate(remote_url).await?;
        let current = self
            .loader
            .load_current()
            .await
            .map_err(|e| UpdateError::CurrentUnavailable(e.to_string()))?;

        if !should_update(&current, &candidate) {
            info!(
                current = current.version,
                remote = candidate.version,
                "No update available"
            );
            return Ok(UpdateOutcome::NoUpdate {
                current_version: current.version,
            });
        }

        info!(
            current = current.version,
            remote = candidate.version,
            exported_at = %candidate.exported_at,
            "Applying dataset update"
        );
        let report = self.commit_dataset(&candidate, base_url).await?;
        Ok(UpdateOutcome::Applied {
            version: candidate.version,
            exported_at: candidate.exported_at,
            icons_fetched: report.fetched.len(),
            icons_failed: report.failed.len(),
        })
    }

    async fn fetch_candidate(&self, remote_url: &str) -> Result<Dataset, UpdateError> {
        let request = Request::get(remote_url)?.no_store();
        let response = self.network.fetch(request).await?;
        if !response.is_success() {
            return Err(UpdateError::from_status(response.status, &response.text()));
        }
        let dataset = Dataset::from_slice(&response.body)?;
        if !dataset.is_populated() {
            return Err(UpdateError::InvalidResponse(
                "dataset has no items".to_string(),
            ));
        }
        Ok(dataset)
    }

    /// Make `dataset` current, then prefetch its icons.
    ///
    /// Icons are best-effort: the dataset stays committed even if every icon
    /// fails. A failed store write aborts before any prefetch.
    pub async fn commit_dataset(&self, dataset: &Dataset, base_url: &str) -> Result<PrefetchReport, UpdateError> {
        self.store.set(keys::SEED_UPDATED, dataset).await?;
        Ok(self.prefetcher.prefetch(dataset, base_url).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStorage, DYNAMIC_CACHE};
    use crate::fetch::mock::MockFetcher;
    use reqwest::Url;
    use serde_json::json;
    use tempfile::TempDir;

    const BUNDLED: &str = "https://board.example/data/seed.json";
    const REMOTE: &str = "https://publisher.example/seed.json";

    fn ds(version: i64, exported_at: &str) -> Dataset {
        serde_json::from_value(json!({
            "version": version,
            "exportedAt": exported_at,
            "items": [{"text": "olá"}]
        }))
        .unwrap()
    }

    fn body(version: i64, exported_at: &str, icons: &[&str]) -> String {
        let items: Vec<_> = icons
            .iter()
            .map(|icon| json!({"text": "x", "icon": icon}))
            .collect();
        json!({"version": version, "exportedAt": exported_at, "items": items}).to_string()
    }

    struct Harness {
        _dir: TempDir,
        network: Arc<MockFetcher>,
        store: Arc<KvStore>,
        coordinator: UpdateCoordinator,
    }

    async fn harness_with_store(dir: TempDir, store: Arc<KvStore>) -> Harness {
        let network = Arc::new(MockFetcher::new());
        network.respond(BUNDLED, 200, body(1, "2024-01-01", &["bundled.png"]));
        let loader = DatasetLoader::new(store.clone(), network.clone(), Url::parse(BUNDLED).unwrap());
        let cache = CacheStorage::new(dir.path().join("caches"))
            .open(DYNAMIC_CACHE)
            .await
            .unwrap();
        let prefetcher = IconPrefetcher::new(
            network.clone(),
            cache,
            Url::parse("https://board.example/").unwrap(),
        );
        let coordinator = UpdateCoordinator::new(network.clone(), store.clone(), loader, prefetcher);
        Harness {
            _dir: dir,
            network,
            store,
            coordinator,
        }
    }

    async fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(KvStore::new(dir.path().join("kv")));
        harness_with_store(dir, store).await
    }

    #[test]
    fn test_higher_version_always_wins() {
        for (a, b) in [(2, 1), (10, 3), (1, 0)] {
            assert!(should_update(&ds(b, "T"), &ds(a, "T")));
            assert!(!should_update(&ds(a, "T"), &ds(b, "T")));
        }
    }

    #[test]
    fn test_version_beats_timestamp() {
        assert!(should_update(&ds(2, "T1"), &ds(3, "T0")));
        assert!(!should_update(&ds(3, "T0"), &ds(2, "T9")));
    }

    #[test]
    fn test_equal_version_uses_timestamp() {
        assert!(!should_update(&ds(1, "2024-01-01"), &ds(1, "2024-01-01")));
        assert!(should_update(&ds(1, "2024-01-01"), &ds(1, "2024-01-02")));
        // Differing but older stamps still count on a tie
        assert!(should_update(&ds(1, "2024-01-02"), &ds(1, "2024-01-01")));
        // Empty candidate stamp never counts
        assert!(!should_update(&ds(1, "2024-01-01"), &ds(1, "")));
        assert!(should_update(&ds(1, ""), &ds(1, "2024-01-01")));
    }

    #[tokio::test]
    async fn test_same_version_and_stamp_is_no_update() {
        let h = harness().await;
        h.network.respond(REMOTE, 200, body(1, "2024-01-01", &["a.png"]));
        let outcome = h.coordinator.check_for_update(REMOTE, "https://cdn/x").await;
        assert_eq!(outcome, UpdateOutcome::NoUpdate { current_version: 1 });
        assert!(h.store.get(keys::SEED_UPDATED).await.unwrap().is_none());
        assert_eq!(h.network.calls("https://cdn/x/a.png"), 0);
    }

    #[tokio::test]
    async fn test_newer_version_is_applied_and_prefetched() {
        let h = harness().await;
        h.network.respond(REMOTE, 200, body(3, "T0", &["a.png", "a.png", ""]));
        h.network.respond("https://cdn/x/a.png", 200, "PNG");

        let outcome = h.coordinator.check_for_update(REMOTE, "https://cdn/x").await;
        assert_eq!(
            outcome,
            UpdateOutcome::Applied {
                version: 3,
                exported_at: "T0".to_string(),
                icons_fetched: 1,
                icons_failed: 0,
            }
        );
        assert!(outcome.requires_reload());
        let stored: Dataset = h.store.get_as(keys::SEED_UPDATED).await.unwrap().unwrap();
        assert_eq!(stored.version, 3);
        assert_eq!(h.network.calls("https://cdn/x/a.png"), 1);
    }

    #[tokio::test]
    async fn test_repeat_check_after_commit_is_idempotent() {
        let h = harness().await;
        h.network.respond(REMOTE, 200, body(2, "T2", &["a.png"]));
        h.network.respond("https://board.example/a.png", 200, "A");

        assert!(h.coordinator.check_for_update(REMOTE, "").await.requires_reload());
        assert_eq!(
            h.coordinator.check_for_update(REMOTE, "").await,
            UpdateOutcome::NoUpdate { current_version: 2 }
        );
    }

    #[tokio::test]
    async fn test_republished_same_version_is_applied() {
        let h = harness().await;
        h.network.respond(REMOTE, 200, body(1, "2024-06-01", &["a.png"]));
        let outcome = h.coordinator.check_for_update(REMOTE, "").await;
        assert!(matches!(outcome, UpdateOutcome::Applied { version: 1, .. }));
    }

    #[tokio::test]
    async fn test_http_error_fails_without_commit() {
        let h = harness().await;
        h.network.respond(REMOTE, 500, "oops");
        let outcome = h.coordinator.check_for_update(REMOTE, "").await;
        match outcome {
            UpdateOutcome::Failed { message } => assert!(message.contains("500")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(h.store.get(keys::SEED_UPDATED).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_network_error_fails() {
        let h = harness().await;
        h.network.fail(REMOTE);
        assert!(matches!(
            h.coordinator.check_for_update(REMOTE, "").await,
            UpdateOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_without_commit() {
        let h = harness().await;
        h.network.respond(REMOTE, 200, "{\"version\": 5, \"items\": [");
        assert!(matches!(
            h.coordinator.check_for_update(REMOTE, "").await,
            UpdateOutcome::Failed { .. }
        ));
        h.network.respond(REMOTE, 200, "{\"version\": 5, \"items\": []}");
        assert!(matches!(
            h.coordinator.check_for_update(REMOTE, "").await,
            UpdateOutcome::Failed { .. }
        ));
        assert!(h.store.get(keys::SEED_UPDATED).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_fetch_bypasses_http_cache() {
        let h = harness().await;
        h.network.respond(REMOTE, 200, body(1, "2024-01-01", &[]));
        h.coordinator.check_for_update(REMOTE, "").await;
        let remote_request = h
            .network
            .requests()
            .into_iter()
            .find(|r| r.url.as_str() == REMOTE)
            .unwrap();
        assert_eq!(remote_request.cache_mode, crate::fetch::CacheMode::NoStore);
    }

    #[tokio::test]
    async fn test_icon_failures_do_not_undo_commit() {
        let h = harness().await;
        h.network.respond(REMOTE, 200, body(4, "T4", &["a.png", "b.png"]));
        h.network.fail("https://cdn/x/a.png");
        h.network.respond("https://cdn/x/b.png", 500, "");

        let outcome = h.coordinator.check_for_update(REMOTE, "https://cdn/x").await;
        assert!(matches!(outcome, UpdateOutcome::Applied { icons_failed: 2, icons_fetched: 0, .. }));
        let stored: Dataset = h.store.get_as(keys::SEED_UPDATED).await.unwrap().unwrap();
        assert_eq!(stored.version, 4);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_before_prefetch() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("kv");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = Arc::new(KvStore::new(&blocker));
        let h = harness_with_store(dir, store).await;
        h.network.respond(REMOTE, 200, body(5, "T5", &["a.png"]));
        h.network.respond("https://cdn/x/a.png", 200, "A");

        let outcome = h.coordinator.check_for_update(REMOTE, "https://cdn/x").await;
        assert!(matches!(outcome, UpdateOutcome::Failed { .. }));
        assert_eq!(h.network.calls("https://cdn/x/a.png"), 0);
    }

    #[tokio::test]
    async fn test_check_configured() {
        let h = harness().await;
        assert_eq!(h.coordinator.check_configured().await, UpdateOutcome::NotConfigured);

        h.store.set(keys::UPDATES_URL, "  ").await.unwrap();
        assert_eq!(h.coordinator.check_configured().await, UpdateOutcome::NotConfigured);

        h.store.set(keys::UPDATES_URL, REMOTE).await.unwrap();
        h.store.set(keys::UPDATES_BASE_URL, "https://cdn/x").await.unwrap();
        h.network.respond(REMOTE, 200, body(2, "T", &["a.png"]));
        h.network.respond("https://cdn/x/a.png", 200, "A");
        assert!(h.coordinator.check_configured().await.requires_reload());
        assert_eq!(h.network.calls("https://cdn/x/a.png"), 1);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(UpdateOutcome::NoUpdate { current_version: 2 }).unwrap();
        assert_eq!(json, json!({"status": "noUpdate", "currentVersion": 2}));
    }
}
