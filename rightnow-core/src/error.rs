//! Error types for rightnow-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the rightnow-core library
#[derive(Error, Debug)]
pub enum Error {
    /// The document could not be read (missing, unreadable, not UTF-8)
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be written or renamed into place
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document text that does not match the grammar (usually a bad header)
    #[error("parse error: {0}")]
    Parse(String),

    /// A mutation was requested before any document was loaded
    #[error("no document loaded")]
    NotLoaded,

    /// Change watcher setup failed
    #[error("watch error: {0}")]
    Watch(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watch(err.to_string())
    }
}

/// Result type alias for rightnow-core
pub type Result<T> = std::result::Result<T, Error>;
