//! Board state for the command-line front end.
//!
//! `BoardApp` owns everything the presentation layer keeps between commands:
//! the loaded dataset, the active category, the sentence being composed and
//! the voice settings. Preference changes are written back to the store as
//! they happen; a failed write is logged and the in-memory state kept.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use boardsync_core::prefetch::normalize_icon_url;
use boardsync_core::store::keys;
use boardsync_core::{Dataset, DatasetLoader, DatasetSource, KvStore, SHORTCUTS_CATEGORY_ID};

// ============================================================================
// Constants
// ============================================================================

/// Tiles shown per page, matching the fixed grid of the board.
pub const MAX_TILES: usize = 12;

/// Speech rate and pitch are limited to this range.
pub const VOICE_MIN: f64 = 0.5;
pub const VOICE_MAX: f64 = 2.0;

fn clamp_voice(value: f64) -> f64 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(VOICE_MIN, VOICE_MAX)
    }
}

// ============================================================================
// State Types
// ============================================================================

/// One word or phrase in the composed sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// Resolved icon URL, empty for typed text
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tile {
    Category { id: String, label: String },
    Item { text: String, icon: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub lang: String,
    pub rate: f64,
    pub pitch: f64,
}

pub struct BoardApp {
    store: Arc<KvStore>,
    pub dataset: Dataset,
    pub source: DatasetSource,
    pub base_url: String,
    /// `None` while on the menu
    pub active_category: Option<String>,
    pub sentence: Vec<Token>,
    pub voice: VoiceSettings,
}

impl BoardApp {
    /// Load the current dataset and restore saved preferences.
    pub async fn load(store: Arc<KvStore>, loader: &DatasetLoader) -> Result<Self> {
        let (dataset, source) = loader.load_current_with_source().await?;
        let mut app = Self {
            store,
            voice: VoiceSettings {
                lang: dataset.voice_defaults.lang.clone(),
                rate: clamp_voice(dataset.voice_defaults.rate),
                pitch: clamp_voice(dataset.voice_defaults.pitch),
            },
            dataset,
            source,
            base_url: String::new(),
            active_category: None,
            sentence: Vec::new(),
        };
        app.restore_preferences().await;
        Ok(app)
    }

    /// Pick up a newly committed dataset. The sentence survives; a category
    /// that no longer exists drops back to the menu.
    pub async fn reload(&mut self, loader: &DatasetLoader) -> Result<()> {
        let (dataset, source) = loader.load_current_with_source().await?;
        debug!(version = dataset.version, "Reloaded dataset");
        self.dataset = dataset;
        self.source = source;
        self.base_url = self.read_string(keys::UPDATES_BASE_URL).await;
        if let Some(ref id) = self.active_category {
            if self.dataset.category(id).is_none() {
                self.active_category = None;
            }
        }
        Ok(())
    }

    async fn restore_preferences(&mut self) {
        self.base_url = self.read_string(keys::UPDATES_BASE_URL).await;

        let page = self.read_string(keys::UI_ACTIVE_PAGE).await;
        if !page.is_empty() && self.dataset.category(&page).is_some() {
            self.active_category = Some(page);
        }

        match self.store.get_as::<Vec<Token>>(keys::UI_SENTENCE).await {
            Ok(Some(sentence)) => self.sentence = sentence,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not restore sentence"),
        }

        if let Ok(Some(rate)) = self.store.get_as::<f64>(keys::VOICE_RATE).await {
            self.voice.rate = clamp_voice(rate);
        }
        if let Ok(Some(pitch)) = self.store.get_as::<f64>(keys::VOICE_PITCH).await {
            self.voice.pitch = clamp_voice(pitch);
        }
    }

    async fn read_string(&self, key: &str) -> String {
        match self.store.get_as::<String>(key).await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(key, error = %e, "Could not read preference");
                String::new()
            }
        }
    }

    async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.store.set(key, value).await {
            warn!(key, error = %e, "Could not save preference");
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub async fn open_category(&mut self, id: &str) -> Result<()> {
        if id == SHORTCUTS_CATEGORY_ID || self.dataset.category(id).is_none() {
            bail!("Unknown category: {}", id);
        }
        self.active_category = Some(id.to_string());
        self.save(keys::UI_ACTIVE_PAGE, id).await;
        Ok(())
    }

    pub async fn back_to_menu(&mut self) {
        self.active_category = None;
        self.save(keys::UI_ACTIVE_PAGE, "").await;
    }

    fn item_tile(&self, item: &boardsync_core::Item) -> Tile {
        let icon = item
            .icon()
            .map(|path| normalize_icon_url(&self.base_url, path))
            .filter(|url| !url.is_empty());
        Tile::Item {
            text: item.text.clone(),
            icon,
        }
    }

    /// Tiles for the current view.
    ///
    /// Inside a category: its items followed by the shortcuts. On the menu:
    /// every non-shortcut category followed by the shortcuts. Never more
    /// than `MAX_TILES`.
    pub fn tiles(&self) -> Vec<Tile> {
        let shortcuts = self.dataset.shortcuts().map(|item| self.item_tile(item));
        match self.active_category {
            Some(ref id) => self
                .dataset
                .items_in(id)
                .map(|item| self.item_tile(item))
                .chain(shortcuts)
                .take(MAX_TILES)
                .collect(),
            None => self
                .dataset
                .categories
                .iter()
                .filter(|c| c.id != SHORTCUTS_CATEGORY_ID)
                .map(|c| Tile::Category {
                    id: c.id.clone(),
                    label: c.label.clone(),
                })
                .chain(shortcuts)
                .take(MAX_TILES)
                .collect(),
        }
    }

    // ========================================================================
    // Sentence
    // ========================================================================

    /// Add the item whose text matches, case-insensitively, carrying its
    /// icon. Text that matches no item is added as typed.
    pub async fn add_item(&mut self, text: &str) {
        let wanted = text.trim();
        let matched = self
            .dataset
            .items
            .iter()
            .find(|item| item.text.to_lowercase() == wanted.to_lowercase());
        match matched {
            Some(item) => {
                let icon = item
                    .icon()
                    .map(|path| normalize_icon_url(&self.base_url, path))
                    .unwrap_or_default();
                let token = Token {
                    text: item.text.clone(),
                    icon,
                };
                self.push(token).await;
            }
            None => self.add_text(wanted).await,
        }
    }

    /// Keyboard entry. Blank text is ignored.
    pub async fn add_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let token = Token {
            text: text.to_string(),
            icon: String::new(),
        };
        self.push(token).await;
    }

    async fn push(&mut self, token: Token) {
        self.sentence.push(token);
        self.save(keys::UI_SENTENCE, &self.sentence).await;
    }

    pub async fn remove_at(&mut self, index: usize) -> Option<Token> {
        if index >= self.sentence.len() {
            return None;
        }
        let removed = self.sentence.remove(index);
        self.save(keys::UI_SENTENCE, &self.sentence).await;
        Some(removed)
    }

    pub async fn pop(&mut self) -> Option<Token> {
        let removed = self.sentence.pop();
        if removed.is_some() {
            self.save(keys::UI_SENTENCE, &self.sentence).await;
        }
        removed
    }

    pub async fn clear(&mut self) {
        self.sentence.clear();
        self.save(keys::UI_SENTENCE, &self.sentence).await;
    }

    pub fn sentence_text(&self) -> String {
        self.sentence
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }

    // ========================================================================
    // Voice
    // ========================================================================

    pub async fn set_voice(&mut self, rate: f64, pitch: f64) {
        self.voice.rate = clamp_voice(rate);
        self.voice.pitch = clamp_voice(pitch);
        self.save(keys::VOICE_RATE, &self.voice.rate).await;
        self.save(keys::VOICE_PITCH, &self.voice.pitch).await;
    }
}
