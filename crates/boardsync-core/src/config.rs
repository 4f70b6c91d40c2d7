//! Application configuration.
//!
//! Stored at `~/.config/boardsync/config.json`. A missing file yields the
//! defaults; missing fields are filled in individually.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::prefetch::DEFAULT_PREFETCH_CONCURRENCY;

/// Application name used for config/data directory paths
const APP_NAME: &str = "boardsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_ORIGIN: &str = "http://localhost:8080/";
const DEFAULT_BUNDLED_DATASET: &str = "data/seed.json";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

fn default_shell() -> Vec<String> {
    ["./", "index.html", "app.js", "manifest.webmanifest", DEFAULT_BUNDLED_DATASET]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin the application shell is served from
    pub origin: String,
    /// Shell resources, relative to the origin
    pub shell: Vec<String>,
    pub bundled_dataset_path: String,
    pub request_timeout_secs: u64,
    pub prefetch_concurrency: usize,
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            shell: default_shell(),
            bundled_dataset_path: DEFAULT_BUNDLED_DATASET.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            prefetch_concurrency: DEFAULT_PREFETCH_CONCURRENCY,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoDirectory("config"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDirectory("data"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn store_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join("kv"))
    }

    pub fn caches_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join("caches"))
    }

    /// The origin as a URL, always ending in `/` so relative joins land
    /// beneath it.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let mut origin = self.origin.trim().to_string();
        if !origin.ends_with('/') {
            origin.push('/');
        }
        Url::parse(&origin).map_err(|_| ConfigError::InvalidOrigin(self.origin.clone()))
    }

    pub fn bundled_dataset_url(&self) -> Result<Url, ConfigError> {
        self.origin_url()?
            .join(&self.bundled_dataset_path)
            .map_err(|_| ConfigError::InvalidOrigin(self.origin.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.origin, DEFAULT_ORIGIN);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.shell.contains(&"data/seed.json".to_string()));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"origin": "https://board.example/app", "prefetch_concurrency": 2}"#).unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.prefetch_concurrency, 2);
        assert_eq!(config.bundled_dataset_path, DEFAULT_BUNDLED_DATASET);
        assert_eq!(config.origin_url().unwrap().as_str(), "https://board.example/app/");
        assert_eq!(
            config.bundled_dataset_url().unwrap().as_str(),
            "https://board.example/app/data/seed.json"
        );
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            data_dir: Some(dir.path().join("data")),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.store_dir().unwrap(), dir.path().join("data").join("kv"));
        assert_eq!(loaded.caches_dir().unwrap(), dir.path().join("data").join("caches"));
    }

    #[test]
    fn test_invalid_origin() {
        let config = Config {
            origin: "not a url".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.origin_url(), Err(ConfigError::InvalidOrigin(_))));
    }
}
