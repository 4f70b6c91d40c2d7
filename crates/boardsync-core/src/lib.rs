//! boardsync-core - offline data sync for a communication board.
//!
//! Keeps a versioned board dataset and its icon assets available without a
//! network: a durable key-value store holds the committed dataset, named
//! response caches hold the application shell and runtime assets, and an
//! update coordinator pulls newer datasets from a configured endpoint.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod format;
pub mod intercept;
pub mod loader;
pub mod models;
mod persist;
pub mod prefetch;
pub mod store;
pub mod update;

pub use cache::{CacheEntry, CachePartition, CacheStorage, PartitionStats, DYNAMIC_CACHE, STATIC_CACHE};
pub use config::Config;
pub use context::{SyncContext, INTERCEPTOR_VERSION};
pub use error::{CacheError, ConfigError, FetchError, InstallError, StoreError, UpdateError};
pub use fetch::{CacheMode, Fetcher, HttpFetcher, Request, Response};
pub use intercept::{Interceptor, Registration};
pub use loader::{DatasetLoader, DatasetSource};
pub use models::{Category, Dataset, Item, VoiceDefaults, SHORTCUTS_CATEGORY_ID};
pub use prefetch::{normalize_icon_url, IconPrefetcher, PrefetchReport};
pub use store::{keys, KvStore};
pub use update::{should_update, UpdateCoordinator, UpdateOutcome};
