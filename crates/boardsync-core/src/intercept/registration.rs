use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::info;

use super::Interceptor;
use crate::error::{FetchError, InstallError};
use crate::fetch::{Fetcher, Request, Response};

/// Routes requests through the active interceptor, or straight to the
/// network when none is active.
///
/// Every clone shares the same slot, so activating a new interceptor takes
/// over requests from all holders immediately, without a restart.
#[derive(Clone)]
pub struct Registration {
    active: Arc<RwLock<Option<Interceptor>>>,
    network: Arc<dyn Fetcher>,
}

impl Registration {
    pub fn new(network: Arc<dyn Fetcher>) -> Self {
        Self {
            active: Arc::new(RwLock::new(None)),
            network,
        }
    }

    /// Install the interceptor's shell, then activate it. Returns the number
    /// of shell resources cached.
    /// A failed install leaves the current interceptor in place.
    pub async fn register(&self, worker: Interceptor, shell: &[String]) -> Result<usize, InstallError> {
        let installed = worker.install(shell).await?;
        self.activate(worker);
        Ok(installed)
    }

    /// Make `worker` the active interceptor, superseding any previous one.
    pub fn activate(&self, worker: Interceptor) {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let version = worker.version().to_string();
        match active.replace(worker) {
            Some(previous) => {
                info!(version = %version, previous = %previous.version(), "Interceptor superseded")
            }
            None => info!(version = %version, "Interceptor activated"),
        }
    }

    pub fn active(&self) -> Option<Interceptor> {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn active_version(&self) -> Option<String> {
        self.active().map(|w| w.version().to_string())
    }
}

#[async_trait]
impl Fetcher for Registration {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        match self.active() {
            Some(worker) => worker.fetch(request).await,
            None => self.network.fetch(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use crate::fetch::mock::MockFetcher;
    use reqwest::Url;
    use tempfile::TempDir;

    const ORIGIN: &str = "https://board.example/";

    async fn worker(version: &str, network: Arc<MockFetcher>, dir: &TempDir) -> Interceptor {
        Interceptor::new(
            version,
            Url::parse(ORIGIN).unwrap(),
            network,
            CacheStorage::new(dir.path()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_passes_through_without_active_worker() {
        let network = Arc::new(MockFetcher::new());
        let url = "https://board.example/index.html";
        network.respond(url, 200, "x");
        let registration = Registration::new(network.clone());
        registration.fetch(Request::get(url).unwrap()).await.unwrap();
        registration.fetch(Request::get(url).unwrap()).await.unwrap();
        assert_eq!(network.calls(url), 2);
        assert!(registration.active_version().is_none());
    }

    #[tokio::test]
    async fn test_register_activates_and_clones_follow() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockFetcher::new());
        network.respond("https://board.example/index.html", 200, "shell");
        let registration = Registration::new(network.clone());
        let page = registration.clone();

        let v1 = worker("v1", network.clone(), &dir).await;
        registration.register(v1, &["index.html".to_string()]).await.unwrap();
        assert_eq!(page.active_version().as_deref(), Some("v1"));

        // Served from the shell cache, not the network
        page.fetch(Request::get("https://board.example/index.html").unwrap())
            .await
            .unwrap();
        assert_eq!(network.calls("https://board.example/index.html"), 1);

        let v2 = worker("v2", network.clone(), &dir).await;
        registration.activate(v2);
        assert_eq!(page.active_version().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_worker() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(MockFetcher::new());
        let registration = Registration::new(network.clone());
        registration.activate(worker("v1", network.clone(), &dir).await);

        let v2 = worker("v2", network.clone(), &dir).await;
        let result = registration.register(v2, &["missing.js".to_string()]).await;
        assert!(result.is_err());
        assert_eq!(registration.active_version().as_deref(), Some("v1"));
    }
}
