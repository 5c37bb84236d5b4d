//! Streaming file download for large binary artifacts (the OSM extract).

use std::path::Path;
use std::sync::Arc;

use crash_hotspots_config::progress::ProgressCallback;
use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;

use crate::{SourceError, partial_path, retry};

/// Downloads a URL to `dest`, streaming to a `.part` file and renaming
/// it into place once complete.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails, the stream is cut, or
/// the file cannot be written.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<u64, SourceError> {
    log::info!("Downloading {url}");
    log::info!("  -> {}", dest.display());

    let part = partial_path(dest);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(crate::io_error(parent))?;
    }

    let response = retry::send_streaming(|| client.get(url)).await?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        progress.set_total(size);
        #[allow(clippy::cast_precision_loss)]
        let mb = size as f64 / 1_048_576.0;
        log::info!("  file size: {mb:.1} MB");
    }

    let mut file = tokio::fs::File::create(&part)
        .await
        .map_err(crate::io_error(&part))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(crate::io_error(&part))?;
        downloaded += chunk.len() as u64;
        progress.set_position(downloaded);
    }

    file.flush().await.map_err(crate::io_error(&part))?;
    drop(file);

    tokio::fs::rename(&part, dest)
        .await
        .map_err(crate::io_error(dest))?;

    #[allow(clippy::cast_precision_loss)]
    let mb = downloaded as f64 / 1_048_576.0;
    log::info!("  download complete: {mb:.1} MB");
    progress.finish_and_clear();

    Ok(downloaded)
}
