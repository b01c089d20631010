//! Direct HTTP access to the portal through an adopted session.

pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod markup;

use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

pub use self::discovery::Paginator;
pub use self::endpoints::Endpoints;
pub use self::error::PortalError;
pub use self::markup::SchoologyMarkup;
use crate::retry::{self, RetryAction, RetryConfig};
use crate::session::HttpContext;

/// Body of a record expansion response.
#[derive(Debug, Deserialize)]
struct ExpansionResponse {
    update: String,
}

#[derive(Debug, Clone)]
pub struct PortalClient {
    http: HttpContext,
    endpoints: Endpoints,
    retry: RetryConfig,
}

fn classify(e: &PortalError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

impl PortalClient {
    pub fn new(http: HttpContext, retry: RetryConfig) -> Self {
        let endpoints = Endpoints::new(http.base_url().clone());
        Self {
            http,
            endpoints,
            retry,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn http(&self) -> &HttpContext {
        &self.http
    }

    /// GET a page and return its markup with JSON escapes decoded.
    pub async fn fetch_markup(&self, url: &Url) -> Result<String, PortalError> {
        retry::retry_with_backoff(&self.retry, classify, || async {
            let response = self
                .http
                .client()
                .get(url.clone())
                .send()
                .await
                .map_err(|source| PortalError::Http {
                    url: url.to_string(),
                    source,
                })?;
            let response = check_status(response, url)?;
            let body = response.text().await.map_err(|source| PortalError::Http {
                url: url.to_string(),
                source,
            })?;
            tracing::debug!("Fetched {} ({} bytes)", url, body.len());
            Ok(markup::decode_escaped_markup(&body).into_owned())
        })
        .await
    }

    /// POST to a record's "show more" endpoint and return the full body HTML.
    pub async fn fetch_expansion(&self, href: &str) -> Result<String, PortalError> {
        let url = self.endpoints.join(href)?;
        retry::retry_with_backoff(&self.retry, classify, || async {
            let response = self
                .http
                .client()
                .post(url.clone())
                .send()
                .await
                .map_err(|source| PortalError::Http {
                    url: url.to_string(),
                    source,
                })?;
            let response = check_status(response, &url)?;
            let expansion: ExpansionResponse =
                response
                    .json()
                    .await
                    .map_err(|e| PortalError::MalformedResponse {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;
            Ok(expansion.update)
        })
        .await
    }
}

fn check_status(response: reqwest::Response, url: &Url) -> Result<reqwest::Response, PortalError> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PortalError::Unauthorized {
            status: status.as_u16(),
            url: url.to_string(),
        }),
        _ => Err(PortalError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use url::Url;

    use super::PortalClient;
    use crate::retry::RetryConfig;
    use crate::session::{self, ExternalCookie};

    /// A portal client pointed at a mock server with a single session cookie.
    pub(crate) fn client_for(server_uri: &str) -> PortalClient {
        let cookie = ExternalCookie {
            name: "SESS".into(),
            value: "test".into(),
            path: "/".into(),
            domain: None,
            expiry: None,
            secure: false,
            http_only: true,
        };
        let base = Url::parse(server_uri).unwrap();
        let http = session::adopt(&[cookie], &base, Duration::from_secs(5)).unwrap();
        PortalClient::new(http, RetryConfig::none())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::client_for;
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_markup_decodes_escapes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/course/1/materials"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"html":"<a href=\"\/album\/3\">Zoo<\/a>"}"#),
            )
            .mount(&server)
            .await;

        let portal = client_for(&server.uri());
        let url = portal.endpoints().album_listing("1").unwrap();
        let body = portal.fetch_markup(&url).await.unwrap();
        assert!(body.contains(r#"<a href="/album/3">Zoo</a>"#));
    }

    #[tokio::test]
    async fn test_rejected_session_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let portal = client_for(&server.uri());
        let url = portal.endpoints().feed("1").unwrap();
        let err = portal.fetch_markup(&url).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_fetch_expansion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/update_post/5/show_more"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"update": "<p>full</p>"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let portal = client_for(&server.uri());
        let html = portal
            .fetch_expansion("/update_post/5/show_more")
            .await
            .unwrap();
        assert_eq!(html, "<p>full</p>");
    }

    #[tokio::test]
    async fn test_fetch_expansion_without_update_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let portal = client_for(&server.uri());
        let err = portal.fetch_expansion("/x").await.unwrap_err();
        assert!(matches!(err, PortalError::MalformedResponse { .. }));
    }
}
