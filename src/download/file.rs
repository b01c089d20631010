use std::path::Path;

use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::DownloadError;
use super::paths::part_path;

/// Stream a response body to `final_path` via a hidden `.part` sibling.
///
/// The final name only ever appears once the body has been fully written, so
/// an interrupted transfer never leaves a file that later looks complete.
/// Returns the number of bytes written.
pub(crate) async fn write_response(
    response: reqwest::Response,
    url: &str,
    final_path: &Path,
) -> Result<u64, DownloadError> {
    let part = part_path(final_path);
    let written = stream_to(response, url, &part, final_path).await;
    if written.is_err() {
        if let Err(e) = fs::remove_file(&part).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Could not remove {}: {}", part.display(), e);
            }
        }
    }
    let bytes_written = written?;

    tracing::debug!(
        "Wrote {} bytes to {}",
        bytes_written,
        final_path.display()
    );
    Ok(bytes_written)
}

/// Write the body into `part`, then move it over `final_path`.
async fn stream_to(
    response: reqwest::Response,
    url: &str,
    part: &Path,
    final_path: &Path,
) -> Result<u64, DownloadError> {
    let content_length = response.content_length();
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part)
        .await
        .map_err(|e| DownloadError::disk(part, e))?;

    let mut bytes_written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| {
            tracing::warn!(
                "Body error for {} (content_length={:?}, bytes_so_far={}): {}",
                url,
                content_length,
                bytes_written,
                source
            );
            DownloadError::Http {
                source,
                url: url.to_string(),
                bytes_written,
            }
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::disk(part, e))?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| DownloadError::disk(part, e))?;
    drop(file);

    fs::rename(part, final_path)
        .await
        .map_err(|e| DownloadError::disk(final_path, e))?;
    Ok(bytes_written)
}
