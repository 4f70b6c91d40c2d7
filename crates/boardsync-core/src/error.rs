//! Error types for the sync core.
//!
//! Each subsystem gets its own enum so callers can tell a storage failure
//! apart from a network failure and degrade accordingly.

use thiserror::Error;

/// Maximum length for response bodies embedded in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Offline and not cached: {0}")]
    NotCached(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    #[error("Corrupt record for key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Value for key {key} is not serializable: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("Failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Shell resource {url} could not be fetched: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Shell resource {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Shell cache write failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid shell path {0}")]
    InvalidPath(String),
}

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Malformed dataset: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Could not load current dataset: {0}")]
    CurrentUnavailable(String),

    #[error("Could not commit dataset: {0}")]
    Commit(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find {0} directory")]
    NoDirectory(&'static str),

    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid origin URL {0}")]
    InvalidOrigin(String),
}

impl UpdateError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = truncate_body(body);
        match status {
            401 | 403 => UpdateError::AccessDenied(format!("HTTP {}: {}", status, truncated)),
            404 => UpdateError::NotFound(format!("HTTP 404: {}", truncated)),
            500..=599 => UpdateError::ServerError(format!("HTTP {}: {}", status, truncated)),
            _ => UpdateError::InvalidResponse(format!("HTTP {}: {}", status, truncated)),
        }
    }
}
