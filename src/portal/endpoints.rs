//! URL builders for the portal pages the sync engine reads.

use url::Url;

use super::error::PortalError;

/// Query parameter the album listing pages on.
pub const LISTING_PAGE_PARAM: &str = "page";

#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// `https://<subdomain>.schoology.com`
    pub fn for_subdomain(subdomain: &str) -> Result<Self, PortalError> {
        let input = format!("https://{}.schoology.com", subdomain.trim());
        let base = Url::parse(&input).map_err(|source| PortalError::InvalidUrl { input, source })?;
        Ok(Self::new(base))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Album listing for a course, without the page parameter.
    pub fn album_listing(&self, root_id: &str) -> Result<Url, PortalError> {
        let mut url = self.join(&format!("/course/{}/materials", root_id))?;
        url.query_pairs_mut()
            .append_pair("list_filter", "album")
            .append_pair("ajax", "1")
            .append_pair("style", "full");
        Ok(url)
    }

    pub fn feed(&self, root_id: &str) -> Result<Url, PortalError> {
        let mut url = self.join(&format!("/course/{}/feed", root_id))?;
        url.query_pairs_mut().append_pair("filter", "1");
        Ok(url)
    }

    /// Media files referenced from album pages live under `/system/files/`.
    pub fn media(&self, media_path: &str) -> Result<Url, PortalError> {
        self.join(&format!("/system/files/{}", media_path.trim_start_matches('/')))
    }

    /// Resolve a site-relative href (album keys, expansion links, attachments).
    pub fn join(&self, href: &str) -> Result<Url, PortalError> {
        self.base.join(href).map_err(|source| PortalError::InvalidUrl {
            input: href.to_string(),
            source,
        })
    }
}
