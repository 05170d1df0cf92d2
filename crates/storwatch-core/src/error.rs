//! Error types for StorWatch.
//!
//! Only construction-time operations return these. Background threads log
//! their failures and keep going.

use thiserror::Error;

/// Result type alias using [`WatchError`].
pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Error, Debug)]
pub enum WatchError {
    /// I/O error, e.g. reading a config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`WatchConfig`](crate::config::WatchConfig).
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Config parsed but a value is out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A background thread could not be spawned.
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called on a watcher whose threads are already running.
    #[error("Watcher already started")]
    AlreadyStarted,

    /// The OS notification receiver could not be registered.
    #[error("Notification receiver error: {0}")]
    Receiver(String),
}
