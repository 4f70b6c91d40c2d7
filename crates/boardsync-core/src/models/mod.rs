//! Data models for the board dataset.
//!
//! - `Dataset`: the versioned document driving the board
//! - `Category`, `Item`: board structure
//! - `VoiceDefaults`: speech settings shipped with the dataset

pub mod dataset;

pub use dataset::{Category, Dataset, Item, VoiceDefaults, SHORTCUTS_CATEGORY_ID};
