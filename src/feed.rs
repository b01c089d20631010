//! Record extractor: turns the course feed into [`RecordSnapshot`]s,
//! expanding truncated bodies and downloading attachments on the way.

use std::path::PathBuf;
use std::sync::Arc;

use crate::collab::TextExtractor;
use crate::download::{paths, MediaDownloader};
use crate::portal::markup::{FeedEntry, FeedMarkup};
use crate::portal::{PortalClient, PortalError};
use crate::state::{Attachment, RecordSnapshot};

impl From<FeedEntry> for RecordSnapshot {
    /// Snapshot of a record exactly as it appears on the feed page, with
    /// attachments listed but not downloaded.
    fn from(entry: FeedEntry) -> Self {
        RecordSnapshot {
            key: entry.key,
            timestamp: entry.timestamp,
            author: entry.author,
            avatar_url: entry.avatar_url,
            body: entry.body.text,
            rich_body: entry.body.html,
            expansion_href: entry.expansion_href,
            attachments_html: entry.attachments_html,
            images: entry.body.images,
            attachments: entry
                .attachments
                .into_iter()
                .map(|link| Attachment {
                    url: link.href,
                    filename: link.filename,
                    local_path: None,
                    extracted_text: None,
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct FeedExtractor {
    portal: PortalClient,
    markup: Arc<dyn FeedMarkup>,
    downloader: MediaDownloader,
    text_extractor: Option<Arc<dyn TextExtractor>>,
    attachments_dir: PathBuf,
}

impl FeedExtractor {
    pub fn new(
        portal: PortalClient,
        markup: Arc<dyn FeedMarkup>,
        downloader: MediaDownloader,
        attachments_dir: PathBuf,
    ) -> Self {
        Self {
            portal,
            markup,
            downloader,
            text_extractor: None,
            attachments_dir,
        }
    }

    pub fn with_text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.text_extractor = Some(extractor);
        self
    }

    /// Fetch the course feed and extract every record on it.
    ///
    /// Records for which `is_known` returns true are returned as parsed;
    /// only new records pay for expansion and attachment downloads.
    pub async fn extract(
        &self,
        root_id: &str,
        is_known: impl Fn(&str) -> bool,
    ) -> Result<Vec<RecordSnapshot>, PortalError> {
        let url = self.portal.endpoints().feed(root_id)?;
        let html = self.portal.fetch_markup(&url).await?;
        let entries = self.markup.records(&html);
        tracing::info!(records = entries.len(), "Parsed course feed");

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            if is_known(&entry.key) {
                records.push(RecordSnapshot::from(entry));
            } else {
                records.push(self.resolve(entry).await);
            }
        }
        Ok(records)
    }

    /// Expand the body and download attachments of one record. Never fails:
    /// each missing piece is logged and left out.
    pub async fn resolve(&self, entry: FeedEntry) -> RecordSnapshot {
        let mut entry = entry;
        if !entry.expansion_href.is_empty() {
            tracing::info!("Loading full text of record {}", entry.key);
            match self.portal.fetch_expansion(&entry.expansion_href).await {
                Ok(fragment) => entry.body = self.markup.expanded_body(&fragment),
                Err(e) => tracing::warn!(
                    "Keeping truncated body of record {}: {}",
                    entry.key,
                    e
                ),
            }
        }

        let mut record = RecordSnapshot::from(entry);
        for attachment in &mut record.attachments {
            self.resolve_attachment(attachment).await;
        }
        record
    }

    async fn resolve_attachment(&self, attachment: &mut Attachment) {
        let url = match self.portal.endpoints().join(&attachment.url) {
            Ok(u) => u.to_string(),
            Err(e) => {
                tracing::warn!("Skipping attachment '{}': {}", attachment.filename, e);
                return;
            }
        };
        attachment.url = url;

        let fetched = match self
            .downloader
            .fetch(&attachment.url, &self.attachments_dir)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(
                    "Failed to download attachment '{}': {}",
                    attachment.filename,
                    e
                );
                return;
            }
        };
        let path = fetched.path();

        if let Some(extractor) = self
            .text_extractor
            .as_ref()
            .filter(|_| paths::is_document(&path))
        {
            match extractor.extract_text(&path).await {
                Ok(text) => attachment.extracted_text = Some(text),
                Err(e) => tracing::warn!("No text from {}: {}", path.display(), e),
            }
        }
        attachment.local_path = Some(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CollaboratorError;
    use crate::portal::test_support::client_for;
    use crate::portal::SchoologyMarkup;
    use crate::retry::RetryConfig;
    use std::path::Path;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct EchoPath;

    #[async_trait::async_trait]
    impl TextExtractor for EchoPath {
        async fn extract_text(&self, path: &Path) -> Result<String, CollaboratorError> {
            Ok(format!("text of {}", path.file_name().unwrap().to_string_lossy()))
        }
    }

    const FEED: &str = r#"<ul>
      <li id="edge-assoc-2" class="first">
        <a title="View user profile.">Mr. Okafor</a>
        <span class="update-body s-rte">Concert tonight...</span>
        <a class="show-more-link" href="/update_post/2/show_more">Show More</a>
        <div class="attachments clearfix">
          <a href="/attachment/20/source/program.pdf"><span aria-label="program.pdf"></span></a>
          <a href="/attachment/21/source/missing.pdf"><span aria-label="missing.pdf"></span></a>
        </div>
      </li>
      <li id="edge-assoc-1" class="">
        <a title="View user profile.">Ms. Lee</a>
        <span class="update-body s-rte">Old news...</span>
        <a class="show-more-link" href="/update_post/1/show_more">Show More</a>
      </li>
    </ul>"#;

    async fn server_with_feed() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/course/77/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/update_post/2/show_more"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"update": "<p>Concert tonight at 7pm.</p><img src=\"/s.jpg\">"}),
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/update_post/1/show_more"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/attachment/20/source/program.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", r#"attachment; filename="program.pdf""#)
                    .set_body_string("%PDF"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/attachment/21/source/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    fn extractor(server: &MockServer, dir: &Path) -> FeedExtractor {
        let portal = client_for(&server.uri());
        let downloader = MediaDownloader::new(portal.http().client().clone(), RetryConfig::none());
        FeedExtractor::new(
            portal,
            Arc::new(SchoologyMarkup),
            downloader,
            dir.to_path_buf(),
        )
        .with_text_extractor(Arc::new(EchoPath))
    }

    #[tokio::test]
    async fn test_only_new_records_are_expanded() {
        let server = server_with_feed().await;
        let dir = tempfile::tempdir().unwrap();
        let records = extractor(&server, dir.path())
            .extract("77", |key| key == "1")
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "2");
        assert_eq!(records[0].body, "Concert tonight at 7pm.");
        assert_eq!(records[0].images, vec!["/s.jpg".to_string()]);
        assert_eq!(records[1].key, "1");
        assert_eq!(records[1].body, "Old news...");
    }

    #[tokio::test]
    async fn test_attachment_failure_keeps_record() {
        let server = server_with_feed().await;
        let dir = tempfile::tempdir().unwrap();
        let records = extractor(&server, dir.path())
            .extract("77", |key| key == "1")
            .await
            .unwrap();

        let attachments = &records[0].attachments;
        assert_eq!(attachments.len(), 2);

        let program = &attachments[0];
        assert_eq!(program.local_path, Some(dir.path().join("program.pdf")));
        assert_eq!(program.extracted_text.as_deref(), Some("text of program.pdf"));
        assert!(program.url.ends_with("/attachment/20/source/program.pdf"));

        let missing = &attachments[1];
        assert_eq!(missing.filename, "missing.pdf");
        assert_eq!(missing.local_path, None);
        assert_eq!(missing.extracted_text, None);
    }

    #[tokio::test]
    async fn test_failed_expansion_keeps_truncated_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let x = extractor(&server, dir.path());
        let entry = SchoologyMarkup
            .records(FEED)
            .into_iter()
            .nth(1)
            .unwrap();
        let record = x.resolve(entry).await;
        assert_eq!(record.body, "Old news...");
        assert_eq!(record.author, "Ms. Lee");
    }

    #[test]
    fn test_snapshots_keep_document_order() {
        let keys: Vec<String> = SchoologyMarkup
            .records(FEED)
            .into_iter()
            .map(|e| RecordSnapshot::from(e).key)
            .collect();
        assert_eq!(keys, vec!["2", "1"]);
    }
}
