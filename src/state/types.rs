//! Types persisted in the state document.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` like a missing field. Older documents write
/// `null` for attributes the page did not carry.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Root of the persisted state: one document per course.
///
/// Field aliases accept the older snake_case layout (`course_id`,
/// `downloaded`, `updates`), so an existing config document loads as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Course identifier. Set once, never rewritten afterwards.
    #[serde(default, deserialize_with = "null_as_default", alias = "course_id")]
    pub root_id: String,
    /// Albums known to be fully downloaded, keyed by album path.
    #[serde(default, deserialize_with = "null_as_default", alias = "downloaded")]
    pub acquired_collections: BTreeMap<String, CollectionRecord>,
    /// Feed posts already routed to notification, keyed by post id.
    #[serde(default, deserialize_with = "null_as_default", alias = "updates")]
    pub dispatched_records: BTreeMap<String, RecordSnapshot>,
}

/// Whether `id` can name the per-course media directory: one path segment
/// of ASCII letters, digits, `-` or `_`.
pub fn is_plain_root_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl SyncState {
    /// Adopt a root id if none is recorded yet.
    ///
    /// Returns the effective root id. A conflicting candidate never replaces
    /// the persisted one, and a candidate that is not a plain path segment
    /// is never adopted.
    pub fn adopt_root_id(&mut self, candidate: Option<&str>) -> &str {
        match candidate.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) if !is_plain_root_id(c) => {
                tracing::warn!(ignored = c, "Root id must be a single plain path segment");
            }
            Some(c) if self.root_id.is_empty() => {
                tracing::info!(root_id = c, "Recording root id");
                self.root_id = c.to_string();
            }
            Some(c) if c != self.root_id => {
                tracing::warn!(
                    persisted = %self.root_id,
                    ignored = c,
                    "Root id is immutable once recorded, ignoring new value"
                );
            }
            _ => {}
        }
        &self.root_id
    }

    pub fn is_acquired(&self, key: &str) -> bool {
        self.acquired_collections.contains_key(key)
    }

    pub fn mark_acquired(&mut self, record: CollectionRecord) {
        self.acquired_collections.insert(record.key.clone(), record);
    }

    /// Whether a record with this key was already dispatched.
    ///
    /// An empty key never matches: anonymous records are always reprocessed.
    pub fn is_dispatched(&self, key: &str) -> bool {
        !key.is_empty() && self.dispatched_records.contains_key(key)
    }

    /// Store a dispatched record. Returns false when the key is empty and
    /// the record therefore cannot be remembered.
    pub fn mark_dispatched(&mut self, record: RecordSnapshot) -> bool {
        if record.key.is_empty() {
            return false;
        }
        self.dispatched_records.insert(record.key.clone(), record);
        true
    }

    pub fn evict_collection(&mut self, key: &str) -> Option<CollectionRecord> {
        self.acquired_collections.remove(key)
    }

    pub fn evict_record(&mut self, key: &str) -> Option<RecordSnapshot> {
        self.dispatched_records.remove(key)
    }

    pub fn summary(&self) -> StateSummary {
        let last_acquired_at = self
            .acquired_collections
            .values()
            .map(|c| c.acquired_at_epoch)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));
        StateSummary {
            root_id: self.root_id.clone(),
            acquired_collections: self.acquired_collections.len(),
            dispatched_records: self.dispatched_records.len(),
            last_acquired_at,
        }
    }
}

/// An album whose media has been fully downloaded (or touched).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    #[serde(alias = "url", deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    /// Seconds since the Unix epoch.
    #[serde(default, deserialize_with = "null_as_default", alias = "downloaded_at")]
    pub acquired_at_epoch: f64,
}

impl CollectionRecord {
    pub fn acquired_now(key: &str, title: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            key: key.to_string(),
            title: title.to_string(),
            acquired_at_epoch: now.timestamp_millis() as f64 / 1000.0,
        }
    }
}

/// One feed post as extracted from the course feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    #[serde(default, deserialize_with = "null_as_default", alias = "post_id")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default", alias = "datetime")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(default, deserialize_with = "null_as_default", alias = "profile_pic_url")]
    pub avatar_url: String,
    /// Plain text of the post, trimmed.
    #[serde(default, deserialize_with = "null_as_default", alias = "content")]
    pub body: String,
    /// Markup of the post body.
    #[serde(default, deserialize_with = "null_as_default", alias = "html_content")]
    pub rich_body: String,
    #[serde(default, deserialize_with = "null_as_default", alias = "show_more_href")]
    pub expansion_href: String,
    #[serde(default, deserialize_with = "null_as_default", alias = "attachments_html_content")]
    pub attachments_html: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<Attachment>,
}

impl RecordSnapshot {
    /// Extracted text of every attachment that has one, in order.
    pub fn attachment_texts(&self) -> impl Iterator<Item = &str> {
        self.attachments
            .iter()
            .filter_map(|a| a.extracted_text.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// Local paths of every attachment that was downloaded.
    pub fn attachment_paths(&self) -> Vec<PathBuf> {
        self.attachments
            .iter()
            .filter_map(|a| a.local_path.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    /// Absent when the download failed.
    #[serde(default, alias = "full_path", skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(default, alias = "text", skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

/// Counts reported by the `status` command.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSummary {
    pub root_id: String,
    pub acquired_collections: usize,
    pub dispatched_records: usize,
    pub last_acquired_at: Option<f64>,
}
