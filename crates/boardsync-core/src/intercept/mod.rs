//! Request interception with per-origin caching policies.
//!
//! An `Interceptor` sits between the application and the network:
//!
//! - same-origin GET: cache-first, network fallback, no revalidation
//! - cross-origin GET: stale-while-revalidate against the dynamic cache
//! - anything else: passed straight through
//!
//! `Registration` holds whichever interceptor is currently active and lets a
//! new version take over in place.

pub mod registration;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Url;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CachePartition, CacheStorage, DYNAMIC_CACHE, STATIC_CACHE};
use crate::error::{CacheError, FetchError, InstallError};
use crate::fetch::{Fetcher, Method, Request, Response};

pub use registration::Registration;

/// Clone is cheap; clones share caches and background refreshes.
#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<Inner>,
}

struct Inner {
    version: String,
    origin: Url,
    network: Arc<dyn Fetcher>,
    caches: CacheStorage,
    shell: CachePartition,
    dynamic: CachePartition,
    revalidations: Mutex<JoinSet<()>>,
}

impl Interceptor {
    /// Open the static and dynamic partitions and build an interceptor for
    /// `origin`. Same-origin lookups consult the static shell first.
    pub async fn new(
        version: impl Into<String>,
        origin: Url,
        network: Arc<dyn Fetcher>,
        caches: CacheStorage,
    ) -> Result<Self, CacheError> {
        let shell = caches.open(STATIC_CACHE).await?;
        let dynamic = caches.open(DYNAMIC_CACHE).await?;
        Ok(Self {
            inner: Arc::new(Inner {
                version: version.into(),
                origin,
                network,
                caches,
                shell,
                dynamic,
                revalidations: Mutex::new(JoinSet::new()),
            }),
        })
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    fn shell_requests(&self, shell: &[String]) -> Result<Vec<Request>, InstallError> {
        shell
            .iter()
            .map(|path| {
                self.inner
                    .origin
                    .join(path)
                    .map(|url| Request::new(Method::GET, url))
                    .map_err(|_| InstallError::InvalidPath(path.clone()))
            })
            .collect()
    }

    /// Whether every resource in `shell` is present in the static cache.
    pub async fn is_installed(&self, shell: &[String]) -> bool {
        if shell.is_empty() {
            return false;
        }
        let requests = match self.shell_requests(shell) {
            Ok(requests) => requests,
            Err(e) => {
                warn!(error = %e, "Shell list is not valid for this origin");
                return false;
            }
        };
        for request in &requests {
            match self.inner.shell.entry(request).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!(url = %request.url, "Shell resource missing");
                    return false;
                }
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Could not inspect shell cache");
                    return false;
                }
            }
        }
        true
    }

    /// Fetch every shell resource and write them all into the static cache.
    ///
    /// All-or-nothing: if any resource fails or returns a non-2xx status,
    /// nothing is written. If a write fails, entries already written by this
    /// install are removed again.
    pub async fn install(&self, shell: &[String]) -> Result<usize, InstallError> {
        let requests = self.shell_requests(shell)?;

        let fetches = requests.into_iter().map(|request| async move {
            let url = request.url.to_string();
            let response = self
                .inner
                .network
                .fetch(request.clone())
                .await
                .map_err(|source| InstallError::Fetch {
                    url: url.clone(),
                    source,
                })?;
            if !response.is_success() {
                return Err(InstallError::Status {
                    url,
                    status: response.status,
                });
            }
            Ok((request, response))
        });
        let fetched = try_join_all(fetches).await?;

        for (written, (request, response)) in fetched.iter().enumerate() {
            if let Err(e) = self.inner.shell.put(request, response).await {
                warn!(url = %request.url, error = %e, "Shell write failed, rolling back install");
                for (request, _) in &fetched[..written] {
                    if let Err(e) = self.inner.shell.delete(request).await {
                        warn!(url = %request.url, error = %e, "Could not remove partial shell entry");
                    }
                }
                return Err(e.into());
            }
        }
        info!(version = %self.inner.version, resources = fetched.len(), "Installed application shell");
        Ok(fetched.len())
    }

    /// Wait for every background refresh started so far.
    pub async fn settle(&self) {
        let mut tasks = self.inner.revalidations.lock().await;
        while tasks.join_next().await.is_some() {}
    }

    async fn cache_first(&self, request: Request) -> Result<Response, FetchError> {
        if let Some(cached) = self.inner.caches.match_any(&request).await {
            debug!(url = %request.url, "Served from cache");
            return Ok(cached);
        }

        match self.inner.network.fetch(request.clone()).await {
            Ok(response) => {
                if response.is_success() {
                    if let Err(e) = self.inner.dynamic.put(&request, &response).await {
                        warn!(url = %request.url, error = %e, "Failed to cache response");
                    }
                }
                Ok(response)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network failed and nothing cached");
                Err(FetchError::NotCached(request.url.to_string()))
            }
        }
    }

    async fn stale_while_revalidate(&self, request: Request) -> Result<Response, FetchError> {
        let cached = match self.inner.dynamic.match_request(&request).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        };

        match cached {
            Some(cached) => {
                debug!(url = %request.url, "Served stale copy, refreshing in background");
                self.spawn_revalidation(request).await;
                Ok(cached)
            }
            None => self.revalidate(request.clone()).await.map_err(|e| {
                warn!(url = %request.url, error = %e, "Network failed and nothing cached");
                FetchError::NotCached(request.url.to_string())
            }),
        }
    }

    /// Fetch from the network and refresh the dynamic cache on success.
    async fn revalidate(&self, request: Request) -> Result<Response, FetchError> {
        let response = self.inner.network.fetch(request.clone()).await?;
        if response.is_success() {
            if let Err(e) = self.inner.dynamic.put(&request, &response).await {
                warn!(url = %request.url, error = %e, "Failed to refresh cached response");
            }
        }
        Ok(response)
    }

    async fn spawn_revalidation(&self, request: Request) {
        let this = self.clone();
        let mut tasks = self.inner.revalidations.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = this.revalidate(request).await {
                debug!(error = %e, "Background refresh failed, keeping cached copy");
            }
        });
    }
}

#[async_trait]
impl Fetcher for Interceptor {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        if !request.is_get() {
            return self.inner.network.fetch(request).await;
        }
        if request.same_origin(&self.inner.origin) {
            self.cache_first(request).await
        } else {
            self.stale_while_revalidate(request).await
        }
    }
}
