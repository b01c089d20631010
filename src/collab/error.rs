use thiserror::Error;

/// Failures of an external collaborator (summarizer, translator, delivery,
/// text extraction).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("I/O with '{command}' failed: {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}
