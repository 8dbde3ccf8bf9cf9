use std::path::PathBuf;

use thiserror::Error;

/// Failure talking to the quote provider. Never escapes the fetcher:
/// every variant is folded into a `Quote` in error state.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Conditions that keep the monitor from entering its main loop.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("cannot read watch-list {path}: {reason}")]
    WatchList { path: PathBuf, reason: String },

    #[error("watch-list {0} contains no valid symbols")]
    NoWatchItems(PathBuf),

    #[error("terminal unavailable: {0}")]
    Terminal(String),
}
