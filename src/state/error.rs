//! Error types for the state store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, saving or locking the state document.
#[derive(Error, Debug)]
pub enum StateError {
    /// The persisted document exists but cannot be parsed. Fatal: the run
    /// aborts before any network activity so nothing is processed twice.
    #[error("State document at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Another process holds the lock on this state document.
    #[error("Another schoology-sync instance is using this state (lock: {path})")]
    Locked { path: PathBuf },

    #[error("Failed to serialize state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("State I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StateError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
