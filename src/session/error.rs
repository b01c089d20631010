use std::path::PathBuf;

use thiserror::Error;

/// Failures translating an externally obtained session into an HTTP context.
///
/// Every variant is fatal for the run: without a usable cookie jar all
/// subsequent portal requests would fail.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Malformed cookie '{name}': {reason}")]
    InvalidCookie { name: String, reason: String },

    #[error("Session provided no usable cookies ({expired} expired)")]
    NoUsableCookies { expired: usize },

    #[error("Failed to read session file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Session file {path} is not valid JSON: {source}")]
    MalformedFile {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
