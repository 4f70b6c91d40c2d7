//! Durable key-value storage for JSON values.
//!
//! `KvStore` backs the committed dataset, the update source settings and the
//! presentation layer's preference records. One file per key; writes replace
//! the previous value atomically.

pub mod keys;
pub mod kv;

pub use kv::{KvStore, StoreRecord};
