//! Error types for recwatch-core operations.
//!
//! Classification and detection entry points deliberately do not return
//! these: missing platform members answer sentinels, ambiguous pixel
//! statistics answer low-confidence verdicts, capture failures are
//! outcomes. The variants here cover the fallible plumbing around the
//! engine - spawning the log feed and the photo store.

use std::path::PathBuf;

/// All errors that can occur in recwatch-core operations.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {context}: {source}")]
    Image {
        context: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Log feed failed to start: {command}: {details}")]
    LogFeedSpawn { command: String, details: String },
}

/// Convenience type alias for Results using WatchError.
pub type Result<T> = std::result::Result<T, WatchError>;
