use thiserror::Error;

use super::lifecycle::WorkerState;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network unreachable for {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Offline: {0}")]
    Offline(String),

    #[error("Bad response for {url}: status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl NetworkError {
    /// Classify a completed response; only 2xx counts as `ok`.
    pub fn from_status(url: &str, status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            _ => Some(NetworkError::BadStatus {
                url: url.to_string(),
                status,
            }),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt bucket {name}: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode bucket: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid bucket name: {0:?}")]
    InvalidName(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install failed while caching {asset}: {source}")]
    Install {
        asset: String,
        #[source]
        source: NetworkError,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Cannot {action} while worker is {state}")]
    InvalidTransition {
        action: &'static str,
        state: WorkerState,
    },

    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    #[error("Worker runtime has shut down")]
    RuntimeClosed,
}
