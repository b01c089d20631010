//! Session bridge: turns cookies obtained by an external login flow into a
//! reusable HTTP client.
//!
//! The login itself (browser automation, SSO redirects, account switching)
//! happens elsewhere. This module only consumes its result, so the sync
//! engine never depends on a browser.

pub mod cookies;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use url::Url;

pub use self::cookies::{ExternalCookie, SessionHandoff};
pub use self::error::SessionError;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Authenticated HTTP context shared by every portal request of a run.
///
/// `reqwest::Client` is backed by an `Arc`, so clones share the connection
/// pool and the cookie jar.
#[derive(Clone)]
pub struct HttpContext {
    client: Client,
    /// Kept so cookies can be inspected in diagnostics; the client holds its
    /// own reference.
    jar: Arc<reqwest::cookie::Jar>,
    base_url: Url,
    adopted: usize,
}

impl std::fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContext")
            .field("base_url", &self.base_url.as_str())
            .field("cookies", &"<redacted>")
            .field("adopted", &self.adopted)
            .finish()
    }
}

impl HttpContext {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Number of cookies placed in the jar.
    pub fn adopted(&self) -> usize {
        self.adopted
    }

    /// Whether the jar would send any cookie to the portal root.
    pub fn has_cookies(&self) -> bool {
        use reqwest::cookie::CookieStore;
        self.jar.cookies(&self.base_url).is_some()
    }
}

/// Build an [`HttpContext`] for `base_url` from provider cookies.
///
/// Expired cookies are dropped. Any malformed cookie, or a set with nothing
/// left to send, fails the whole adoption.
pub fn adopt(
    cookies: &[ExternalCookie],
    base_url: &Url,
    timeout: Duration,
) -> Result<HttpContext, SessionError> {
    let jar = Arc::new(reqwest::cookie::Jar::default());
    let now = chrono::Utc::now();
    let mut adopted = 0usize;
    let mut expired = 0usize;

    for cookie in cookies {
        let header = cookie.to_set_cookie()?;
        if cookie.is_expired(&now)? {
            tracing::debug!("Pruning expired cookie {}", cookie.name);
            expired += 1;
            continue;
        }
        jar.add_cookie_str(&header, base_url);
        adopted += 1;
    }

    if adopted == 0 {
        return Err(SessionError::NoUsableCookies { expired });
    }

    let mut default_headers = HeaderMap::new();
    default_headers.insert(USER_AGENT, HeaderValue::from_str(DEFAULT_USER_AGENT)?);

    let client = Client::builder()
        .cookie_provider(jar.clone())
        .default_headers(default_headers)
        .timeout(timeout)
        .build()?;

    tracing::info!(adopted, expired, "Adopted session for {}", base_url);

    Ok(HttpContext {
        client,
        jar,
        base_url: base_url.clone(),
        adopted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cookie(name: &str, value: &str, expiry: Option<f64>) -> ExternalCookie {
        ExternalCookie {
            name: name.into(),
            value: value.into(),
            path: "/".into(),
            domain: None,
            expiry,
            secure: false,
            http_only: true,
        }
    }

    fn base() -> Url {
        Url::parse("https://school.example.com").unwrap()
    }

    #[test]
    fn test_adopt_counts_and_prunes() {
        let cookies = vec![
            cookie("SESS", "abc", Some(4_102_444_800.0)),
            cookie("old", "x", Some(1_000.0)),
            cookie("plain", "y", None),
        ];
        let ctx = adopt(&cookies, &base(), Duration::from_secs(5)).unwrap();
        assert_eq!(ctx.adopted(), 2);
        assert!(ctx.has_cookies());
    }

    #[test]
    fn test_adopt_rejects_malformed_cookie() {
        let cookies = vec![cookie("SESS", "abc", None), cookie("", "x", None)];
        assert!(matches!(
            adopt(&cookies, &base(), Duration::from_secs(5)),
            Err(SessionError::InvalidCookie { .. })
        ));
    }

    #[test]
    fn test_adopt_requires_live_cookie() {
        let cookies = vec![cookie("old", "x", Some(1_000.0))];
        match adopt(&cookies, &base(), Duration::from_secs(5)) {
            Err(SessionError::NoUsableCookies { expired }) => assert_eq!(expired, 1),
            other => panic!("expected NoUsableCookies, got {:?}", other),
        }
        assert!(adopt(&[], &base(), Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_debug_redacts_cookies() {
        let ctx = adopt(
            &[cookie("SESS", "secret-value", None)],
            &base(),
            Duration::from_secs(5),
        )
        .unwrap();
        let dbg = format!("{:?}", ctx);
        assert!(!dbg.contains("secret-value"));
    }

    #[tokio::test]
    async fn test_adopted_cookie_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .and(header("cookie", "SESS=abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let ctx = adopt(&[cookie("SESS", "abc", None)], &base, Duration::from_secs(5)).unwrap();
        let resp = ctx
            .client()
            .get(base.join("/home").unwrap())
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
    }
}
