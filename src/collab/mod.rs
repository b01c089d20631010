//! Interfaces to the capabilities the sync engine uses but does not own:
//! summarization, translation, message delivery and document text
//! extraction. The engine depends only on these traits.

pub mod command;
pub mod error;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

pub use self::command::CommandCollaborators;
pub use self::error::CollaboratorError;

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, CollaboratorError>;

    async fn translate(&self, text: &str, target_language: &str)
        -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait Deliverer: Send + Sync {
    /// `Ok` only when the message was accepted for delivery.
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<String, CollaboratorError>;
}

/// Envelope handed to the delivery collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub sender: String,
    pub recipient: String,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment_paths: Vec<PathBuf>,
}
