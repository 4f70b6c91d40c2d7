//! Named response caches.
//!
//! Two partitions back the interception layer: a static one holding the
//! application shell, populated once at install time, and a dynamic one
//! filled lazily with anything fetched at runtime. Entries are replaced on
//! every successful refetch and never expire.

pub mod partition;
pub mod storage;

pub use partition::{CacheEntry, CachePartition, PartitionStats};
pub use storage::CacheStorage;

/// Shell assets, written only during install.
pub const STATIC_CACHE: &str = "board-static-v1";

/// Runtime-fetched pages, icons and remote assets.
pub const DYNAMIC_CACHE: &str = "board-dynamic-v1";
