//! Idempotent media downloader: fetches a binary resource at most once per
//! resolved target name.
//!
//! The target name comes from the server's `Content-Disposition` header or,
//! failing that, a random token. Existence of the destination path is the
//! only idempotency check; there is no manifest or content hashing.

pub mod error;
pub mod file;
pub mod paths;

use std::path::{Path, PathBuf};

use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use url::Url;

pub use self::error::DownloadError;
use crate::retry::{self, RetryAction, RetryConfig};

/// Where one resource ends up. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub source_url: String,
    pub destination_dir: PathBuf,
    pub resolved_filename: String,
}

impl DownloadTarget {
    pub fn path(&self) -> PathBuf {
        self.destination_dir.join(&self.resolved_filename)
    }
}

/// Result of one [`MediaDownloader::fetch`] call.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub target: DownloadTarget,
    /// Bytes written by this call; `None` when the file was already present.
    pub transferred: Option<u64>,
}

impl Fetched {
    pub fn path(&self) -> PathBuf {
        self.target.path()
    }

    pub fn was_present(&self) -> bool {
        self.transferred.is_none()
    }
}

/// Downloads through the adopted session's client so media behind the
/// portal login is reachable.
#[derive(Debug, Clone)]
pub struct MediaDownloader {
    client: Client,
    retry: RetryConfig,
}

impl MediaDownloader {
    pub fn new(client: Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Fetch `url` into `destination_dir`, returning the final path.
    ///
    /// When the resolved name already exists the body is never read and the
    /// existing path is returned unchanged.
    pub async fn fetch(&self, url: &str, destination_dir: &Path) -> Result<Fetched, DownloadError> {
        Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        tokio::fs::create_dir_all(destination_dir)
            .await
            .map_err(|e| DownloadError::disk(destination_dir, e))?;

        retry::retry_with_backoff(
            &self.retry,
            |e: &DownloadError| {
                if e.is_retryable() {
                    RetryAction::Retry
                } else {
                    RetryAction::Abort
                }
            },
            || self.attempt(url, destination_dir),
        )
        .await
    }

    async fn attempt(&self, url: &str, destination_dir: &Path) -> Result<Fetched, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| DownloadError::Http {
                source,
                url: url.to_string(),
                bytes_written: 0,
            })?;

        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let resolved_filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(paths::disposition_filename)
            .unwrap_or_else(paths::random_filename);

        let target = DownloadTarget {
            source_url: url.to_string(),
            destination_dir: destination_dir.to_path_buf(),
            resolved_filename,
        };
        let final_path = target.path();

        if tokio::fs::try_exists(&final_path)
            .await
            .map_err(|e| DownloadError::disk(&final_path, e))?
        {
            tracing::debug!("{} already exists, skipping", final_path.display());
            return Ok(Fetched {
                target,
                transferred: None,
            });
        }

        let bytes = file::write_response(response, url, &final_path).await?;
        tracing::info!("Downloaded {} ({} bytes)", final_path.display(), bytes);
        Ok(Fetched {
            target,
            transferred: Some(bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn downloader() -> MediaDownloader {
        MediaDownloader::new(Client::new(), RetryConfig::none())
    }

    #[tokio::test]
    async fn test_disposition_name_used() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system/files/a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", r#"attachment; filename="Menu.pdf""#)
                    .set_body_bytes(b"pdf".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let got = downloader()
            .fetch(&format!("{}/system/files/a", server.uri()), dir.path())
            .await
            .unwrap();
        assert_eq!(got.path(), dir.path().join("Menu.pdf"));
        assert_eq!(got.transferred, Some(3));
        assert_eq!(std::fs::read(got.path()).unwrap(), b"pdf");
    }

    #[tokio::test]
    async fn test_second_fetch_leaves_existing_file() {
        // First response writes "first"; any later one would write "second".
        struct Changing(Arc<AtomicUsize>);
        impl Respond for Changing {
            fn respond(&self, _: &Request) -> ResponseTemplate {
                let body = match self.0.fetch_add(1, Ordering::SeqCst) {
                    0 => "first",
                    _ => "second",
                };
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", r#"inline; filename="p.jpg""#)
                    .set_body_string(body)
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p"))
            .respond_with(Changing(Arc::new(AtomicUsize::new(0))))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/p", server.uri());
        let d = downloader();
        let first = d.fetch(&url, dir.path()).await.unwrap();
        let second = d.fetch(&url, dir.path()).await.unwrap();

        assert_eq!(first.path(), second.path());
        assert!(second.was_present());
        assert_eq!(std::fs::read_to_string(second.path()).unwrap(), "first");
    }

    #[tokio::test]
    async fn test_random_name_without_disposition() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let got = downloader()
            .fetch(&format!("{}/m", server.uri()), dir.path())
            .await
            .unwrap();
        let name = &got.target.resolved_filename;
        assert_eq!(name.len(), paths::RANDOM_NAME_LEN);
        assert!(got.path().exists());
    }

    #[tokio::test]
    async fn test_creates_destination_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", r#"attachment; filename="a.png""#)
                    .set_body_string("x"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("42").join("Sports Day");
        let got = downloader()
            .fetch(&format!("{}/m", server.uri()), &nested)
            .await
            .unwrap();
        assert_eq!(got.path(), nested.join("a.png"));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let d = MediaDownloader::new(
            Client::new(),
            RetryConfig {
                max_retries: 3,
                base_delay_secs: 0,
                max_delay_secs: 0,
            },
        );
        let err = d
            .fetch(&format!("{}/gone", server.uri()), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let d = MediaDownloader::new(
            Client::new(),
            RetryConfig {
                max_retries: 2,
                base_delay_secs: 0,
                max_delay_secs: 0,
            },
        );
        assert!(d
            .fetch(&format!("{}/busy", server.uri()), dir.path())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let dir = tempfile::tempdir().unwrap();
        let err = downloader().fetch("not a url", dir.path()).await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
    }
}
