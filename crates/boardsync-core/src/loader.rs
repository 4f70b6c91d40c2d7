//! Resolves the current dataset.
//!
//! A committed remote dataset in the store takes precedence over the bundled
//! default. Loading never writes to the store.

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, warn};

use crate::error::UpdateError;
use crate::fetch::{Fetcher, Request};
use crate::models::Dataset;
use crate::store::{keys, KvStore};

/// Where the current dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSource {
    /// Committed by a previous update
    Updated,
    /// Shipped with the application shell
    Bundled,
}

#[derive(Clone)]
pub struct DatasetLoader {
    store: Arc<KvStore>,
    fetcher: Arc<dyn Fetcher>,
    bundled_url: Url,
}

impl DatasetLoader {
    /// `fetcher` serves the bundled file; normally the active registration,
    /// so the bundle comes from the shell cache when offline.
    pub fn new(store: Arc<KvStore>, fetcher: Arc<dyn Fetcher>, bundled_url: Url) -> Self {
        Self {
            store,
            fetcher,
            bundled_url,
        }
    }

    /// The committed dataset, if the store holds a populated one.
    /// Storage failures are logged and read as absent.
    pub async fn load_updated(&self) -> Option<Dataset> {
        match self.store.get_as::<Dataset>(keys::SEED_UPDATED).await {
            Ok(Some(dataset)) if dataset.is_populated() => Some(dataset),
            Ok(Some(_)) => {
                debug!("Stored dataset has no items, ignoring");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Could not read stored dataset, falling back to bundled");
                None
            }
        }
    }

    /// The bundled default dataset.
    pub async fn load_bundled(&self) -> Result<Dataset, UpdateError> {
        let request = Request::new(reqwest::Method::GET, self.bundled_url.clone()).no_store();
        let response = self.fetcher.fetch(request).await?;
        if !response.is_success() {
            return Err(UpdateError::from_status(response.status, &response.text()));
        }
        Ok(response.json::<Dataset>()?)
    }

    pub async fn load_current(&self) -> Result<Dataset, UpdateError> {
        Ok(self.load_current_with_source().await?.0)
    }

    pub async fn load_current_with_source(&self) -> Result<(Dataset, DatasetSource), UpdateError> {
        if let Some(updated) = self.load_updated().await {
            debug!(version = updated.version, "Using updated dataset");
            return Ok((updated, DatasetSource::Updated));
        }
        let bundled = self.load_bundled().await?;
        debug!(version = bundled.version, "Using bundled dataset");
        Ok((bundled, DatasetSource::Bundled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::MockFetcher;
    use serde_json::json;
    use tempfile::TempDir;

    const BUNDLED: &str = "https://board.example/data/seed.json";

    fn loader(dir: &TempDir, network: Arc<MockFetcher>) -> (Arc<KvStore>, DatasetLoader) {
        let store = Arc::new(KvStore::new(dir.path()));
        let loader = DatasetLoader::new(store.clone(), network, Url::parse(BUNDLED).unwrap());
        (store, loader)
    }

    fn bundled_body() -> String {
        json!({"version": 1, "exportedAt": "bundle", "items": [{"text": "hi"}]}).to_string()
    }

    #[tokio::test]
    async fn test_falls_back_to_bundled() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockFetcher::new());
        network.respond(BUNDLED, 200, bundled_body());
        let (_, loader) = loader(&dir, network);

        let (dataset, source) = loader.load_current_with_source().await.unwrap();
        assert_eq!(source, DatasetSource::Bundled);
        assert_eq!(dataset.exported_at, "bundle");
    }

    #[tokio::test]
    async fn test_prefers_updated_dataset() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockFetcher::new());
        network.respond(BUNDLED, 200, bundled_body());
        let (store, loader) = loader(&dir, network.clone());
        store
            .set(keys::SEED_UPDATED, &json!({"version": 2, "items": [{"text": "new"}]}))
            .await
            .unwrap();

        let (dataset, source) = loader.load_current_with_source().await.unwrap();
        assert_eq!(source, DatasetSource::Updated);
        assert_eq!(dataset.version, 2);
        assert_eq!(network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_updated_dataset_is_ignored() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockFetcher::new());
        network.respond(BUNDLED, 200, bundled_body());
        let (store, loader) = loader(&dir, network);
        store
            .set(keys::SEED_UPDATED, &json!({"version": 9, "items": []}))
            .await
            .unwrap();

        let dataset = loader.load_current().await.unwrap();
        assert_eq!(dataset.version, 1);
    }

    #[tokio::test]
    async fn test_corrupt_store_falls_back() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockFetcher::new());
        network.respond(BUNDLED, 200, bundled_body());
        let (store, loader) = loader(&dir, network);
        store.set(keys::SEED_UPDATED, &json!({"version": 3})).await.unwrap();
        std::fs::write(dir.path().join("seed.updated.json"), b"garbage").unwrap();

        assert_eq!(loader.load_current().await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_load_does_not_write() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockFetcher::new());
        network.respond(BUNDLED, 200, bundled_body());
        let (store, loader) = loader(&dir, network);
        loader.load_current().await.unwrap();
        assert!(store.get(keys::SEED_UPDATED).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_bundle_is_error() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockFetcher::new());
        network.respond(BUNDLED, 404, "");
        let (_, loader) = loader(&dir, network);
        assert!(matches!(loader.load_current().await, Err(UpdateError::NotFound(_))));
    }
}
