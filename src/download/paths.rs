use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rand::Rng as _;
use regex::Regex;

/// Length of generated names for responses without a disposition filename.
pub const RANDOM_NAME_LEN: usize = 16;

const RANDOM_NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Extensions handed to the text-extraction collaborator.
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt"];

static QUOTED_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bfilename="([^"]+)""#).expect("valid regex"));
static BARE_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bfilename=([^";\s][^;]*)"#).expect("valid regex"));
static EXTENDED_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bfilename\*=(?:UTF-8|ISO-8859-1)?'[^']*'([^;\s]+)"#).expect("valid regex")
});

/// Extract the suggested filename from a `Content-Disposition` header.
///
/// RFC 5987 `filename*=` wins over `filename=`. Path separators are replaced
/// with `.` so a hostile header cannot escape the destination directory.
pub fn disposition_filename(header: &str) -> Option<String> {
    let raw = EXTENDED_FILENAME
        .captures(header)
        .and_then(|c| urlencoding::decode(&c[1]).ok().map(|s| s.into_owned()))
        .or_else(|| QUOTED_FILENAME.captures(header).map(|c| c[1].to_string()))
        .or_else(|| BARE_FILENAME.captures(header).map(|c| c[1].trim().to_string()))?;

    let name = sanitize_filename(&raw);
    match name.as_str() {
        "" | "." | ".." => None,
        _ => Some(name),
    }
}

fn sanitize_filename(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '.',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// A random lowercase alphanumeric name of [`RANDOM_NAME_LEN`] characters.
pub fn random_filename() -> String {
    let mut rng = rand::thread_rng();
    (0..RANDOM_NAME_LEN)
        .map(|_| RANDOM_NAME_ALPHABET[rng.gen_range(0..RANDOM_NAME_ALPHABET.len())] as char)
        .collect()
}

/// Turn an album title into a single directory name.
pub fn normalize_title(title: &str) -> String {
    let name = title.trim().replace('/', "_").replace(':', "");
    if name.is_empty() || name == "." || name == ".." {
        "untitled".to_string()
    } else {
        name
    }
}

/// `<media root>/<root id>/<normalized title>`
pub fn collection_dir(media_root: &Path, root_id: &str, title: &str) -> PathBuf {
    media_root.join(root_id).join(normalize_title(title))
}

/// Whether the file looks like a document worth extracting text from.
pub fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            DOCUMENT_EXTENSIONS
                .iter()
                .any(|d| d.eq_ignore_ascii_case(ext))
        })
}

/// Temp file used while a transfer is in flight.
pub(crate) fn part_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{}.part", name))
}
