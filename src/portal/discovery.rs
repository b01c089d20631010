//! Paginated discovery over numbered listing pages.

use url::Url;

use super::error::PortalError;
use super::markup::{ListingEntry, ListingMarkup};
use super::PortalClient;

/// Default safety cap on non-empty listing pages.
pub const DEFAULT_MAX_PAGES: u32 = 500;

/// Walks `template?<param>=0,1,2...` until a page yields no entries.
///
/// The portal never serves a sparse page followed by a non-empty one, so the
/// first empty page ends the walk. `max_pages` guards against a listing that
/// never runs dry; hitting it is an error, never a silent truncation.
#[derive(Debug, Clone)]
pub struct Paginator {
    template: Url,
    page_param: String,
    max_pages: u32,
}

impl Paginator {
    pub fn new(template: Url, page_param: impl Into<String>, max_pages: u32) -> Self {
        Self {
            template,
            page_param: page_param.into(),
            max_pages,
        }
    }

    pub fn page_url(&self, page: u32) -> Url {
        let mut url = self.template.clone();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != self.page_param.as_str())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(&self.page_param, &page.to_string());
        url
    }

    /// Every entry across all non-empty pages, in page then document order.
    pub async fn discover(
        &self,
        portal: &PortalClient,
        markup: &dyn ListingMarkup,
    ) -> Result<Vec<ListingEntry>, PortalError> {
        let mut entries = Vec::new();
        let mut page: u32 = 0;
        loop {
            let url = self.page_url(page);
            let body = portal.fetch_markup(&url).await?;
            let found = markup.collections(&body);
            if found.is_empty() {
                tracing::debug!("Page {} of {} is empty, done", page, self.template);
                break;
            }
            if page >= self.max_pages {
                return Err(PortalError::PageLimitExceeded {
                    max_pages: self.max_pages,
                    url: self.template.to_string(),
                });
            }
            tracing::debug!("Page {}: {} entries", page, found.len());
            entries.extend(found);
            page += 1;
        }
        tracing::info!(
            pages = page,
            entries = entries.len(),
            "Discovered listing {}",
            self.template
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::test_support::client_for;
    use crate::portal::SchoologyMarkup;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_page(server: &MockServer, page: u32, body: &str, expect: u64) {
        Mock::given(method("GET"))
            .and(path("/course/9/materials"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expect)
            .mount(server)
            .await;
    }

    fn paginator(portal: &PortalClient, max_pages: u32) -> Paginator {
        Paginator::new(
            portal.endpoints().album_listing("9").unwrap(),
            "page",
            max_pages,
        )
    }

    #[test]
    fn test_page_url_replaces_existing_param() {
        let template = Url::parse("https://x.test/list?a=1&page=7&b=2").unwrap();
        let p = Paginator::new(template, "page", 10);
        assert_eq!(p.page_url(3).as_str(), "https://x.test/list?a=1&b=2&page=3");
    }

    #[tokio::test]
    async fn test_n_pages_then_empty_issues_n_plus_one_requests() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            0,
            r#"<a href="/album/1">One</a><a href="/album/2">Two</a>"#,
            1,
        )
        .await;
        mount_page(&server, 1, r#"<a href="/album/3">Three</a>"#, 1).await;
        mount_page(&server, 2, "<p>No more</p>", 1).await;

        let portal = client_for(&server.uri());
        let entries = paginator(&portal, 50)
            .discover(&portal, &SchoologyMarkup)
            .await
            .unwrap();

        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["/album/1", "/album/2", "/album/3"]);
        assert_eq!(entries[2].title, "Three");
    }

    #[tokio::test]
    async fn test_discovery_is_repeatable() {
        let server = MockServer::start().await;
        mount_page(&server, 0, r#"<a href="/album/5">A</a><a href="/album/4">B</a>"#, 2).await;
        mount_page(&server, 1, "", 2).await;

        let portal = client_for(&server.uri());
        let p = paginator(&portal, 50);
        let first = p.discover(&portal, &SchoologyMarkup).await.unwrap();
        let second = p.discover(&portal, &SchoologyMarkup).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let server = MockServer::start().await;
        mount_page(&server, 0, "", 1).await;

        let portal = client_for(&server.uri());
        let entries = paginator(&portal, 50)
            .discover(&portal, &SchoologyMarkup)
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_never_empty_listing_hits_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/album/1">x</a>"#))
            .expect(4)
            .mount(&server)
            .await;

        let portal = client_for(&server.uri());
        let err = paginator(&portal, 3)
            .discover(&portal, &SchoologyMarkup)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PortalError::PageLimitExceeded { max_pages: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_page_error_propagates() {
        let server = MockServer::start().await;
        mount_page(&server, 0, r#"<a href="/album/1">x</a>"#, 1).await;
        Mock::given(method("GET"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let portal = client_for(&server.uri());
        let err = paginator(&portal, 10)
            .discover(&portal, &SchoologyMarkup)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::HttpStatus { status: 404, .. }));
    }
}
