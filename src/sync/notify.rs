//! Builds the outbound message for a record and hands it to the
//! collaborators.

use std::sync::Arc;

use crate::collab::{CollaboratorError, Deliverer, OutboundMessage, Summarizer};
use crate::state::RecordSnapshot;

pub const DEFAULT_SUBJECT: &str = "Homeroom Updates";

#[derive(Debug, Clone, PartialEq)]
pub struct NotifySettings {
    pub sender: String,
    pub bcc: Vec<String>,
    pub subject: String,
    /// Languages the summary is translated into, in output order.
    pub translate_to: Vec<String>,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            sender: String::new(),
            bcc: Vec::new(),
            subject: DEFAULT_SUBJECT.to_string(),
            translate_to: Vec::new(),
        }
    }
}

/// Routes one record through summarize, translate and deliver.
#[derive(Clone)]
pub struct Notifier {
    summarizer: Arc<dyn Summarizer>,
    deliverer: Arc<dyn Deliverer>,
    settings: NotifySettings,
}

fn header_line(record: &RecordSnapshot) -> String {
    format!("On {}, {} posted:", record.timestamp, record.author)
}

/// Plain-text payload handed to the summarizer.
pub fn compose_prompt(record: &RecordSnapshot) -> String {
    let attachment_texts: String = record
        .attachment_texts()
        .map(|t| format!("\n{}", t))
        .collect();
    format!(
        "{}\n\n{}\n\n{}",
        header_line(record),
        record.body,
        attachment_texts
    )
}

/// HTML body: header, the record's own markup, then the summary and each
/// translation separated by rules.
pub fn compose_html(record: &RecordSnapshot, summary: &str, translations: &[String]) -> String {
    let mut html = format!("{}\n<br/><br/>\n{}", header_line(record), record.rich_body);
    for section in std::iter::once(summary).chain(translations.iter().map(String::as_str)) {
        html.push_str("\n<hr/>\n");
        html.push_str(section);
    }
    html
}

impl Notifier {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        deliverer: Arc<dyn Deliverer>,
        settings: NotifySettings,
    ) -> Self {
        Self {
            summarizer,
            deliverer,
            settings,
        }
    }

    pub fn settings(&self) -> &NotifySettings {
        &self.settings
    }

    /// Summarize, translate and build the envelope without delivering it.
    pub async fn compose(&self, record: &RecordSnapshot) -> Result<OutboundMessage, CollaboratorError> {
        let summary = self.summarizer.summarize(&compose_prompt(record)).await?;
        let mut translations = Vec::with_capacity(self.settings.translate_to.len());
        for language in &self.settings.translate_to {
            translations.push(self.summarizer.translate(&summary, language).await?);
        }

        Ok(OutboundMessage {
            sender: self.settings.sender.clone(),
            recipient: self.settings.sender.clone(),
            bcc: self.settings.bcc.clone(),
            subject: self.settings.subject.clone(),
            html_body: compose_html(record, &summary, &translations),
            attachment_paths: record.attachment_paths(),
        })
    }

    /// Deliver one record. `Ok` means the record may be marked dispatched.
    pub async fn notify(&self, record: &RecordSnapshot) -> Result<(), CollaboratorError> {
        let message = self.compose(record).await?;
        tracing::info!(
            bcc = message.bcc.len(),
            attachments = message.attachment_paths.len(),
            "Delivering record {} to {}",
            record.key,
            message.recipient
        );
        self.deliverer.deliver(&message).await
    }
}
