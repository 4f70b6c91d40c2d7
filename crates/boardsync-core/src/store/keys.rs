//! Well-known store keys.
//!
//! Keys are namespaced informally by prefix. The core reads and writes the
//! `seed.*` and `updates.*` keys; the `ui.*` and `voice.*` keys belong to the
//! presentation layer and are only persisted here.

/// Most recently committed remote dataset.
pub const SEED_UPDATED: &str = "seed.updated";

/// Remote dataset endpoint.
pub const UPDATES_URL: &str = "updates.url";

/// Base URL that relative icon paths are joined to.
pub const UPDATES_BASE_URL: &str = "updates.baseUrl";

pub const UI_ACTIVE_PAGE: &str = "ui.activePage";
pub const UI_SENTENCE: &str = "ui.sentence";
pub const VOICE_RATE: &str = "voice.rate";
pub const VOICE_PITCH: &str = "voice.pitch";
