use thiserror::Error;

/// Failures talking to the portal's HTML and AJAX endpoints.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The adopted session was rejected. Every later request would fail too.
    #[error("Session rejected by portal (HTTP {status} from {url}); refresh the session file")]
    Unauthorized { status: u16, url: String },

    #[error("Listing at {url} still had entries after {max_pages} pages; refusing to continue")]
    PageLimitExceeded { max_pages: u32, url: String },

    #[error("Unexpected response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("Cannot build portal URL from '{input}': {source}")]
    InvalidUrl {
        input: String,
        source: url::ParseError,
    },
}

impl PortalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PortalError::Http { .. } => true,
            PortalError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Errors after which no further portal request can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PortalError::Unauthorized { .. })
    }
}
