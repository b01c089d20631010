//! Page parsers. Every structural pattern the engine relies on lives in
//! this file, one trait per page type, so a portal markup change touches
//! only [`SchoologyMarkup`].

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Decode the JSON string escapes the portal's AJAX endpoints wrap HTML in.
///
/// Handles `\uXXXX` (including surrogate pairs), `\"`, `\\`, `\/`, `\'`,
/// `\n`, `\t` and `\r`. Unknown escapes are kept verbatim. Input without a
/// backslash is returned as is.
pub fn decode_escaped_markup(input: &str) -> Cow<'_, str> {
    if !input.contains('\\') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(at) = rest.find('\\') {
        out.push_str(&rest[..at]);
        let escape = &rest[at..];
        let consumed = decode_escape(escape, &mut out);
        rest = &escape[consumed..];
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decode one escape at the start of `s` (which begins with `\`), append it
/// to `out`, and return how many bytes were consumed.
fn decode_escape(s: &str, out: &mut String) -> usize {
    let simple = match s[1..].chars().next() {
        Some('"') => Some('"'),
        Some('\\') => Some('\\'),
        Some('/') => Some('/'),
        Some('\'') => Some('\''),
        Some('n') => Some('\n'),
        Some('t') => Some('\t'),
        Some('r') => Some('\r'),
        Some('u') => None,
        _ => {
            out.push('\\');
            return 1;
        }
    };
    if let Some(c) = simple {
        out.push(c);
        return 2;
    }

    let Some(high) = hex4(&s[2..]) else {
        out.push('\\');
        return 1;
    };
    if (0xD800..0xDC00).contains(&high) {
        if let Some(low) = s
            .get(6..8)
            .filter(|p| *p == "\\u")
            .and_then(|_| hex4(&s[8..]))
            .filter(|low| (0xDC00..0xE000).contains(low))
        {
            let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
            return 12;
        }
    }
    out.push(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
    6
}

fn hex4(s: &str) -> Option<u32> {
    let digits = s.get(..4)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// One `(key, title)` pair from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub key: String,
    pub title: String,
}

/// Body of a feed record, either as first rendered or after expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyContent {
    pub text: String,
    pub html: String,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLink {
    pub href: String,
    pub filename: String,
}

/// A feed record as found on the page, before expansion and attachment
/// download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub key: String,
    pub timestamp: String,
    pub author: String,
    pub avatar_url: String,
    pub body: BodyContent,
    pub expansion_href: String,
    pub attachments_html: String,
    pub attachments: Vec<AttachmentLink>,
}

pub trait ListingMarkup: Send + Sync {
    /// All collection links on one listing page, in document order.
    fn collections(&self, page: &str) -> Vec<ListingEntry>;
}

pub trait AlbumMarkup: Send + Sync {
    /// Direct media paths on an album page, deduplicated, document order.
    fn media_paths(&self, page: &str) -> Vec<String>;

    /// Links to content sub-pages of `album_key`, deduplicated.
    fn content_pages(&self, page: &str, album_key: &str) -> Vec<String>;
}

pub trait FeedMarkup: Send + Sync {
    /// Record containers in document order (newest first on the portal).
    fn records(&self, page: &str) -> Vec<FeedEntry>;

    /// Parse the HTML returned by a record's expansion endpoint.
    fn expanded_body(&self, fragment: &str) -> BodyContent;
}

static ALBUM_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a href="(/album/[0-9]+)"[^>]*>(.+?)</a>"#).expect("album link regex")
});
static MEDIA_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)media_albums/m/[^"'\s<>]*?\.(?:jpg|jpeg|png|gif|mp4)\b"#)
        .expect("media path regex")
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static LI: LazyLock<Selector> = LazyLock::new(|| selector("li"));
static TIMESTAMP: LazyLock<Selector> = LazyLock::new(|| selector("span.small.gray"));
static AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[title="View user profile."]"#));
static AVATAR: LazyLock<Selector> =
    LazyLock::new(|| selector("img.imagecache.imagecache-profile_sm"));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("span.update-body.s-rte"));
static SHOW_MORE: LazyLock<Selector> = LazyLock::new(|| selector("a.show-more-link"));
static ATTACHMENTS: LazyLock<Selector> =
    LazyLock::new(|| selector("div.attachments.clearfix"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));

const RECORD_ID_PREFIX: &str = "edge-assoc-";

/// Parsers for the Schoology course pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchoologyMarkup;

impl ListingMarkup for SchoologyMarkup {
    fn collections(&self, page: &str) -> Vec<ListingEntry> {
        ALBUM_LINK
            .captures_iter(page)
            .map(|c| ListingEntry {
                key: c[1].to_string(),
                title: fragment_text(&c[2]),
            })
            .collect()
    }
}

impl AlbumMarkup for SchoologyMarkup {
    fn media_paths(&self, page: &str) -> Vec<String> {
        dedup(MEDIA_PATH.find_iter(page).map(|m| m.as_str().to_string()))
    }

    fn content_pages(&self, page: &str, album_key: &str) -> Vec<String> {
        let pattern = format!(r"{}/content/[0-9]+", regex::escape(album_key));
        match Regex::new(&pattern) {
            Ok(re) => dedup(re.find_iter(page).map(|m| m.as_str().to_string())),
            Err(e) => {
                tracing::warn!("Cannot scan content pages of {}: {}", album_key, e);
                Vec::new()
            }
        }
    }
}

impl FeedMarkup for SchoologyMarkup {
    fn records(&self, page: &str) -> Vec<FeedEntry> {
        let document = Html::parse_document(page);
        document
            .select(&LI)
            .filter(is_record_container)
            .filter(|li| {
                !li.ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|a| a.value().name() == "li" && is_record_container(&a))
            })
            .map(parse_record)
            .collect()
    }

    fn expanded_body(&self, fragment: &str) -> BodyContent {
        let html = Html::parse_fragment(fragment);
        let root = html.root_element();
        BodyContent {
            text: root.text().collect::<String>().trim().to_string(),
            html: root.inner_html(),
            images: image_sources(root),
        }
    }
}

/// `li` with no class, an empty class, or the `first` marker, that actually
/// holds a record (an `edge-assoc-` id or an update body).
fn is_record_container(li: &ElementRef<'_>) -> bool {
    let marked = match li.value().attr("class") {
        None => true,
        Some(class) => {
            class.trim().is_empty() || class.split_whitespace().any(|c| c == "first")
        }
    };
    marked
        && (li
            .value()
            .id()
            .is_some_and(|id| id.starts_with(RECORD_ID_PREFIX))
            || li.select(&BODY).next().is_some())
}

fn parse_record(li: ElementRef<'_>) -> FeedEntry {
    let key = li
        .value()
        .id()
        .map(|id| id.strip_prefix(RECORD_ID_PREFIX).unwrap_or(id).to_string())
        .unwrap_or_default();

    let body = li
        .select(&BODY)
        .next()
        .map(|span| BodyContent {
            text: element_text(span),
            html: span.html(),
            images: image_sources(span),
        })
        .unwrap_or_default();

    let attachments_div = li.select(&ATTACHMENTS).next();
    let attachments = attachments_div
        .map(|div| {
            div.select(&LINK)
                .filter_map(|a| {
                    let href = a.value().attr("href")?.trim();
                    let span = a.select(&SPAN).next()?;
                    let filename = span
                        .value()
                        .attr("aria-label")
                        .map(str::to_string)
                        .unwrap_or_else(|| element_text(a));
                    (!href.is_empty()).then(|| AttachmentLink {
                        href: href.to_string(),
                        filename,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    FeedEntry {
        key,
        timestamp: first_text(li, &TIMESTAMP),
        author: first_text(li, &AUTHOR),
        avatar_url: first_attr(li, &AVATAR, "src"),
        body,
        expansion_href: first_attr(li, &SHOW_MORE, "href"),
        attachments_html: attachments_div.map(|d| d.html()).unwrap_or_default(),
        attachments,
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> String {
    scope.select(sel).next().map(element_text).unwrap_or_default()
}

fn first_attr(scope: ElementRef<'_>, sel: &Selector, attr: &str) -> String {
    scope
        .select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .unwrap_or_default()
        .to_string()
}

fn image_sources(scope: ElementRef<'_>) -> Vec<String> {
    scope
        .select(&IMG)
        .map(|img| img.value().attr("src").unwrap_or_default().to_string())
        .collect()
}

/// Text content of an HTML snippet, entities decoded and tags dropped.
fn fragment_text(snippet: &str) -> String {
    let html = Html::parse_fragment(snippet);
    html.root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|i| seen.insert(i.clone())).collect()
}
