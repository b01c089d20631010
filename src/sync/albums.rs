//! Album discovery and acquisition.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::error::SyncError;
use crate::download::{paths, MediaDownloader};
use crate::portal::endpoints::LISTING_PAGE_PARAM;
use crate::portal::markup::{AlbumMarkup, ListingMarkup};
use crate::portal::{Paginator, PortalClient, PortalError};
use crate::state::{CollectionRecord, StateStore, SyncState};

/// What happened to one album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumOutcome {
    AlreadyAcquired,
    /// Marked acquired without downloading.
    Touched,
    Acquired { downloaded: usize, present: usize },
    /// Some media or content pages failed; retried next run.
    Incomplete {
        downloaded: usize,
        present: usize,
        failed: usize,
    },
    /// No media found; retried next run.
    Empty,
}

impl AlbumOutcome {
    fn marks_acquired(&self) -> bool {
        matches!(self, AlbumOutcome::Touched | AlbumOutcome::Acquired { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumSummary {
    pub discovered: usize,
    pub acquired: usize,
    pub touched: usize,
    pub skipped: usize,
    pub incomplete: usize,
    pub empty: usize,
    pub failed: usize,
    pub media_downloaded: usize,
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct AlbumOptions {
    pub media_root: PathBuf,
    pub touch: bool,
    pub max_pages: u32,
}

pub struct AlbumAcquirer {
    portal: PortalClient,
    listing: Arc<dyn ListingMarkup>,
    album: Arc<dyn AlbumMarkup>,
    downloader: MediaDownloader,
    options: AlbumOptions,
}

impl AlbumAcquirer {
    pub fn new(
        portal: PortalClient,
        listing: Arc<dyn ListingMarkup>,
        album: Arc<dyn AlbumMarkup>,
        downloader: MediaDownloader,
        options: AlbumOptions,
    ) -> Self {
        Self {
            portal,
            listing,
            album,
            downloader,
            options,
        }
    }

    /// Acquire one album into `<media root>/<root id>/<title>`.
    ///
    /// The album is recorded in `state` only when at least one medium was
    /// fetched and nothing failed, or when running in touch mode.
    pub async fn acquire_album(
        &self,
        key: &str,
        title: &str,
        state: &mut SyncState,
    ) -> Result<AlbumOutcome, PortalError> {
        if state.is_acquired(key) {
            tracing::debug!("Album {} already acquired", key);
            return Ok(AlbumOutcome::AlreadyAcquired);
        }
        if self.options.touch {
            tracing::info!("Touching album '{}' without downloading", title);
            state.mark_acquired(CollectionRecord::acquired_now(key, title));
            return Ok(AlbumOutcome::Touched);
        }

        tracing::info!("Acquiring album '{}' from {}", title, key);
        let page = self.portal.fetch_markup(&self.portal.endpoints().join(key)?).await?;
        let (media, failed_pages) = self.collect_media(&page, key).await?;

        let dir = paths::collection_dir(&self.options.media_root, &state.root_id, title);
        let (mut downloaded, mut present, mut failed) = (0, 0, failed_pages);
        for media_path in &media {
            let url = self.portal.endpoints().media(media_path)?;
            match self.downloader.fetch(url.as_str(), &dir).await {
                Ok(f) if f.was_present() => present += 1,
                Ok(_) => downloaded += 1,
                Err(e) => {
                    tracing::warn!("Failed to download {}: {}", url, e);
                    failed += 1;
                }
            }
        }

        let outcome = match (downloaded + present, failed) {
            (0, 0) => AlbumOutcome::Empty,
            (_, 0) => AlbumOutcome::Acquired {
                downloaded,
                present,
            },
            _ => AlbumOutcome::Incomplete {
                downloaded,
                present,
                failed,
            },
        };
        if outcome.marks_acquired() {
            state.mark_acquired(CollectionRecord::acquired_now(key, title));
        }
        Ok(outcome)
    }

    /// Media paths on the album page, or failing that on its content pages.
    /// Also returns the number of content pages that could not be fetched.
    async fn collect_media(
        &self,
        page: &str,
        key: &str,
    ) -> Result<(Vec<String>, usize), PortalError> {
        let direct = self.album.media_paths(page);
        if !direct.is_empty() {
            return Ok((direct, 0));
        }

        let content_pages = self.album.content_pages(page, key);
        tracing::info!(
            pages = content_pages.len(),
            "No media on album page {}, loading content pages",
            key
        );
        let mut media: Vec<String> = Vec::new();
        let mut failed = 0;
        for href in content_pages {
            let url = self.portal.endpoints().join(&href)?;
            match self.portal.fetch_markup(&url).await {
                Ok(body) => {
                    for m in self.album.media_paths(&body) {
                        if !media.contains(&m) {
                            media.push(m);
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Failed to load content page {}: {}", url, e);
                    failed += 1;
                }
            }
        }
        Ok((media, failed))
    }

    /// Discover every album of the course and acquire each new one, oldest
    /// first, saving state after every album that gets recorded.
    pub async fn run(
        &self,
        state: &mut SyncState,
        store: &dyn StateStore,
        shutdown: &CancellationToken,
    ) -> Result<AlbumSummary, SyncError> {
        SyncError::check_root_id(&state.root_id)?;
        let paginator = Paginator::new(
            self.portal.endpoints().album_listing(&state.root_id)?,
            LISTING_PAGE_PARAM,
            self.options.max_pages,
        );
        let entries = paginator.discover(&self.portal, self.listing.as_ref()).await?;

        let mut summary = AlbumSummary {
            discovered: entries.len(),
            ..Default::default()
        };

        for entry in entries.iter().rev() {
            if shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, leaving remaining albums for the next run");
                summary.interrupted = true;
                break;
            }
            let outcome = match self.acquire_album(&entry.key, &entry.title, state).await {
                Ok(o) => o,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Album '{}' failed: {}", entry.title, e);
                    summary.failed += 1;
                    continue;
                }
            };
            match &outcome {
                AlbumOutcome::AlreadyAcquired => summary.skipped += 1,
                AlbumOutcome::Touched => summary.touched += 1,
                AlbumOutcome::Acquired { downloaded, .. } => {
                    summary.acquired += 1;
                    summary.media_downloaded += downloaded;
                }
                AlbumOutcome::Incomplete {
                    downloaded, failed, ..
                } => {
                    tracing::warn!(
                        "Album '{}' incomplete ({} failed), will retry next run",
                        entry.title,
                        failed
                    );
                    summary.incomplete += 1;
                    summary.media_downloaded += downloaded;
                }
                AlbumOutcome::Empty => {
                    tracing::info!("Album '{}' has no media yet", entry.title);
                    summary.empty += 1;
                }
            }
            if outcome.marks_acquired() {
                store.save(state).await?;
            }
        }
        Ok(summary)
    }
}
