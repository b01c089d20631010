use thiserror::Error;

/// Media and attachment download failures.
///
/// All of these are recoverable at the run level: a failed item is logged
/// and skipped. `is_retryable()` separates transient failures (rate limits,
/// server errors, dropped connections) from permanent ones so the retry loop
/// can stop early.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error {status} downloading {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error downloading {url} (bytes_so_far={bytes_written}): {source}")]
    Http {
        source: reqwest::Error,
        url: String,
        bytes_written: u64,
    },

    #[error("Disk error writing {path}: {source}")]
    Disk {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid download URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl DownloadError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            DownloadError::Http { .. } => true,
            DownloadError::Disk { .. } => false,
            DownloadError::InvalidUrl { .. } => false,
        }
    }

    pub(crate) fn disk(path: &std::path::Path, source: std::io::Error) -> Self {
        DownloadError::Disk {
            path: path.display().to_string(),
            source,
        }
    }
}
