//! Network fetch abstraction.
//!
//! Everything that issues a request goes through the `Fetcher` trait, so the
//! interception layer can wrap the network and tests can substitute a mock.

pub mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;

use crate::error::FetchError;

pub use http::HttpFetcher;
pub use types::{CacheMode, Method, Request, Response};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform a request and return the full response.
    ///
    /// A non-2xx status is still `Ok`: only transport failures are errors.
    async fn fetch(&self, request: Request) -> Result<Response, FetchError>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for std::sync::Arc<F> {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        (**self).fetch(request).await
    }
}
