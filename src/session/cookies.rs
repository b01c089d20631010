//! Cookies handed over by the session provider and their translation into
//! `Set-Cookie` strings the HTTP client's jar understands.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::error::SessionError;

/// Millisecond timestamps are at least this large; second timestamps stay
/// below it until the year 5138.
const MILLIS_THRESHOLD: f64 = 1e11;

/// A cookie as exported by the out-of-band login flow (browser automation
/// or a manual export). Both `expiry` (WebDriver) and `expires` (DevTools)
/// spellings are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCookie {
    pub name: String,
    pub value: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default, alias = "expires")]
    pub expiry: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

/// Contents of a session file: either a bare cookie array or an object that
/// also carries the course id discovered during login.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionHandoff {
    pub root_id: Option<String>,
    pub cookies: Vec<ExternalCookie>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HandoffDoc {
    Bare(Vec<ExternalCookie>),
    Wrapped {
        #[serde(default, alias = "courseId", alias = "course_id")]
        #[serde(rename = "rootId")]
        root_id: Option<String>,
        cookies: Vec<ExternalCookie>,
    },
}

impl SessionHandoff {
    pub fn parse(path: &Path, contents: &str) -> Result<Self, SessionError> {
        let doc: HandoffDoc =
            serde_json::from_str(contents).map_err(|source| SessionError::MalformedFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(match doc {
            HandoffDoc::Bare(cookies) => Self {
                root_id: None,
                cookies,
            },
            HandoffDoc::Wrapped { root_id, cookies } => Self { root_id, cookies },
        })
    }

    pub async fn read(path: &Path) -> Result<Self, SessionError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| SessionError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })?;
        let handoff = Self::parse(path, &contents)?;
        tracing::debug!(
            cookies = handoff.cookies.len(),
            "Read session from {}",
            path.display()
        );
        Ok(handoff)
    }
}

/// Normalize a provider expiry into whole seconds since the epoch.
///
/// Non-positive values mark session cookies (no expiry). Values that are
/// clearly milliseconds are scaled down.
pub(crate) fn normalize_expiry(raw: f64) -> Option<i64> {
    if raw <= 0.0 {
        return None;
    }
    let secs = if raw >= MILLIS_THRESHOLD {
        raw / 1000.0
    } else {
        raw
    };
    Some(secs.floor() as i64)
}

impl ExternalCookie {
    fn invalid(&self, reason: impl Into<String>) -> SessionError {
        SessionError::InvalidCookie {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Expiry in epoch seconds, validated.
    pub(crate) fn expiry_secs(&self) -> Result<Option<i64>, SessionError> {
        match self.expiry {
            Some(raw) if !raw.is_finite() => Err(self.invalid("expiry is not a finite number")),
            Some(raw) => Ok(normalize_expiry(raw)),
            None => Ok(None),
        }
    }

    pub(crate) fn is_expired(&self, now: &DateTime<Utc>) -> Result<bool, SessionError> {
        Ok(self
            .expiry_secs()?
            .is_some_and(|secs| secs <= now.timestamp()))
    }

    /// Render as a `Set-Cookie` header value.
    pub(crate) fn to_set_cookie(&self) -> Result<String, SessionError> {
        if self.name.is_empty() {
            return Err(self.invalid("empty name"));
        }
        if self
            .name
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || "=;,\"".contains(c))
        {
            return Err(self.invalid("name contains reserved characters"));
        }
        if self.value.chars().any(|c| c.is_control() || c == ';') {
            return Err(self.invalid("value contains reserved characters"));
        }
        if !self.path.starts_with('/') {
            return Err(self.invalid(format!("path '{}' is not absolute", self.path)));
        }

        let mut out = format!("{}={}; Path={}", self.name, self.value, self.path);
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(secs) = self.expiry_secs()? {
            let at = DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| self.invalid("expiry out of range"))?;
            out.push_str("; Expires=");
            out.push_str(&at.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }

        cookie::Cookie::parse(out.as_str()).map_err(|e| self.invalid(e.to_string()))?;
        Ok(out)
    }
}
