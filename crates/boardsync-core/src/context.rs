//! Wiring for a running board: one store, one set of caches, one
//! registration shared by everything that issues requests.

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info};

use crate::cache::{CacheStorage, DYNAMIC_CACHE};
use crate::config::Config;
use crate::error::{CacheError, ConfigError, InstallError, StoreError};
use crate::fetch::Fetcher;
use crate::intercept::{Interceptor, Registration};
use crate::loader::DatasetLoader;
use crate::prefetch::IconPrefetcher;
use crate::store::{keys, KvStore};
use crate::update::UpdateCoordinator;

/// Version tag of the interceptor built by this release.
pub const INTERCEPTOR_VERSION: &str = "board-v1";

pub struct SyncContext {
    config: Config,
    origin: Url,
    bundled_url: Url,
    store: Arc<KvStore>,
    caches: CacheStorage,
    network: Arc<dyn Fetcher>,
    registration: Registration,
}

impl SyncContext {
    /// `network` is the raw transport; the context layers interception on top.
    pub fn new(config: Config, network: Arc<dyn Fetcher>) -> Result<Self, ConfigError> {
        let origin = config.origin_url()?;
        let bundled_url = config.bundled_dataset_url()?;
        let store = Arc::new(KvStore::new(config.store_dir()?));
        let caches = CacheStorage::new(config.caches_dir()?);
        let registration = Registration::new(network.clone());
        Ok(Self {
            config,
            origin,
            bundled_url,
            store,
            caches,
            network,
            registration,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }

    pub fn caches(&self) -> &CacheStorage {
        &self.caches
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    async fn interceptor(&self) -> Result<Interceptor, CacheError> {
        Interceptor::new(
            INTERCEPTOR_VERSION,
            self.origin.clone(),
            self.network.clone(),
            self.caches.clone(),
        )
        .await
    }

    /// Activate the interceptor if a previous install left every configured
    /// shell resource in place. Returns whether one is now active.
    pub async fn resume(&self) -> Result<bool, CacheError> {
        let worker = self.interceptor().await?;
        if worker.is_installed(&self.config.shell).await {
            self.registration.activate(worker);
            Ok(true)
        } else {
            debug!("No installed shell, requests go to the network");
            Ok(false)
        }
    }

    /// Install the shell and activate a fresh interceptor.
    pub async fn install(&self) -> Result<usize, InstallError> {
        let worker = self.interceptor().await?;
        self.registration.register(worker, &self.config.shell).await
    }

    /// Loader reading the bundled dataset through the registration, so it is
    /// served from the shell cache when one is installed.
    pub fn loader(&self) -> DatasetLoader {
        DatasetLoader::new(
            self.store.clone(),
            Arc::new(self.registration.clone()),
            self.bundled_url.clone(),
        )
    }

    /// Coordinator that checks and prefetches over the raw network, filling
    /// the same dynamic cache the interceptor serves from.
    pub async fn coordinator(&self) -> Result<UpdateCoordinator, CacheError> {
        let dynamic = self.caches.open(DYNAMIC_CACHE).await?;
        let prefetcher = IconPrefetcher::new(self.network.clone(), dynamic, self.origin.clone())
            .with_concurrency(self.config.prefetch_concurrency);
        Ok(UpdateCoordinator::new(
            self.network.clone(),
            self.store.clone(),
            self.loader(),
            prefetcher,
        ))
    }

    /// Save the remote update source. An empty base URL clears it.
    pub async fn set_source(&self, url: &str, base_url: &str) -> Result<(), StoreError> {
        self.store.set(keys::UPDATES_URL, url.trim()).await?;
        if base_url.trim().is_empty() {
            self.store.remove(keys::UPDATES_BASE_URL).await?;
        } else {
            self.store.set(keys::UPDATES_BASE_URL, base_url.trim()).await?;
        }
        info!(url = url.trim(), "Update source saved");
        Ok(())
    }
}
