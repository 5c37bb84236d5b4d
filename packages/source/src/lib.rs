#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Remote data downloads.
//!
//! Fetches the Chicago crash and people tables from the city's Socrata
//! portal, the community-area boundary layer, and the OSM road extract
//! into the `raw/` directory. Census downloads live in the geography
//! crate.

pub mod download;
pub mod retry;
pub mod socrata;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crash_hotspots_config::DownloadConfig;
use crash_hotspots_config::paths::{DataPaths, ensure_parent};
use crash_hotspots_config::progress::ProgressCallback;

use crate::socrata::SocrataConfig;

/// User-Agent sent with every request.
const USER_AGENT: &str = "crash-hotspots/0.1";

/// Errors that can occur during downloads.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("HTTP error for {url}: {message}")]
    Status {
        /// Request URL.
        url: String,
        /// Status description.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV page parsing or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error (file read/write).
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Downloaded data did not have the expected shape.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },
}

/// Maps an I/O error at `path` into [`SourceError::Io`].
pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SourceError + '_ {
    move |source| SourceError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Temporary sibling path written during download. Only a complete
/// download is renamed to `dest`.
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Builds the HTTP client used for all downloads.
///
/// # Errors
///
/// Returns [`SourceError`] if the client cannot be built.
pub fn build_client() -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(Into::into)
}

/// Whether a download can be skipped because its output already exists.
fn already_present(dest: &Path, force: bool) -> bool {
    let present = !force && dest.exists();
    if present {
        log::info!(
            "{} already exists, skipping (use --force to re-download)",
            dest.display()
        );
    }
    present
}

/// Downloads the crash table to `raw/chicago_crashes.csv`.
///
/// Returns the number of rows fetched, or `None` when skipped.
///
/// # Errors
///
/// Returns [`SourceError`] if the download fails.
pub async fn download_crashes(
    client: &reqwest::Client,
    config: &DownloadConfig,
    paths: &DataPaths,
    force: bool,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Option<u64>, SourceError> {
    let dest = paths.crashes_raw();
    if already_present(&dest, force) {
        return Ok(None);
    }
    let socrata = SocrataConfig {
        api_url: &config.crashes_url,
        order_column: "crash_record_id",
        label: "crashes",
        page_size: config.page_size,
        limit: Some(config.crash_limit),
    };
    socrata::fetch_socrata_csv(client, &socrata, &dest, progress)
        .await
        .map(Some)
}

/// Downloads the people table to `raw/chicago_people.csv`.
///
/// The whole table is paged through; it is larger than a single request
/// can return.
///
/// # Errors
///
/// Returns [`SourceError`] if the download fails.
pub async fn download_people(
    client: &reqwest::Client,
    config: &DownloadConfig,
    paths: &DataPaths,
    force: bool,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Option<u64>, SourceError> {
    let dest = paths.people_raw();
    if already_present(&dest, force) {
        return Ok(None);
    }
    let socrata = SocrataConfig {
        api_url: &config.people_url,
        order_column: "person_id",
        label: "people",
        page_size: config.page_size,
        limit: None,
    };
    socrata::fetch_socrata_csv(client, &socrata, &dest, progress)
        .await
        .map(Some)
}

/// Checks that a body is a non-empty `GeoJSON` `FeatureCollection` and
/// returns its feature count.
///
/// # Errors
///
/// Returns [`SourceError`] if the body is not such a collection.
pub fn feature_count(body: &str) -> Result<usize, SourceError> {
    let json: serde_json::Value = serde_json::from_str(body)?;
    if json.get("type").and_then(serde_json::Value::as_str) != Some("FeatureCollection") {
        return Err(SourceError::Normalization {
            message: "expected a GeoJSON FeatureCollection".to_string(),
        });
    }
    let count = json
        .get("features")
        .and_then(serde_json::Value::as_array)
        .map_or(0, Vec::len);
    if count == 0 {
        return Err(SourceError::Normalization {
            message: "FeatureCollection has no features".to_string(),
        });
    }
    Ok(count)
}

/// Fetches the first of `urls` that answers with a non-empty feature
/// collection, returning its body and feature count.
///
/// # Errors
///
/// Returns the last [`SourceError`] when every URL fails.
async fn fetch_feature_collection(
    client: &reqwest::Client,
    urls: &[&str],
) -> Result<(String, usize), SourceError> {
    let mut last_error = SourceError::Normalization {
        message: "no community-area URL configured".to_string(),
    };
    for url in urls.iter().filter(|u| !u.is_empty()) {
        log::info!("Fetching community areas from {url}");
        let attempt = match retry::send_text(|| client.get(*url)).await {
            Ok(body) => feature_count(&body).map(|count| (body, count)),
            Err(e) => Err(e),
        };
        match attempt {
            Ok(found) => return Ok(found),
            Err(e) => {
                log::warn!("Community areas from {url} failed: {e}");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Downloads community-area boundaries to `raw/community_areas.geojson`,
/// falling back to the secondary export when the primary fails.
///
/// # Errors
///
/// Returns [`SourceError`] if every source fails or the file cannot be
/// written.
pub async fn download_community_areas(
    client: &reqwest::Client,
    config: &DownloadConfig,
    paths: &DataPaths,
    force: bool,
) -> Result<Option<usize>, SourceError> {
    let dest = paths.community_areas_geojson();
    if already_present(&dest, force) {
        return Ok(None);
    }

    let urls = [
        config.community_areas_url.as_str(),
        config.community_areas_fallback_url.as_str(),
    ];
    let (body, count) = fetch_feature_collection(client, &urls).await?;

    ensure_parent(&dest).map_err(io_error(&dest))?;
    std::fs::write(&dest, body).map_err(io_error(&dest))?;
    log::info!("Saved {count} community areas to {}", dest.display());
    Ok(Some(count))
}

/// Downloads the OSM extract to `raw/chicago.osm.pbf`.
///
/// # Errors
///
/// Returns [`SourceError`] if the download fails.
pub async fn download_osm(
    client: &reqwest::Client,
    config: &DownloadConfig,
    paths: &DataPaths,
    force: bool,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Option<u64>, SourceError> {
    let dest = paths.osm_pbf();
    if already_present(&dest, force) {
        return Ok(None);
    }
    download::download_file(client, &config.osm_pbf_url, &dest, progress)
        .await
        .map(Some)
}

#[cfg(test)]
pub(crate) mod tests {
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    use super::*;

    pub(crate) const NOT_FOUND: &str =
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    pub(crate) fn ok_response(content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Serves `responses` in order, one per connection, and returns the
    /// server's base URL.
    pub(crate) async fn serve(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        format!("http://{addr}")
    }

    const COLLECTION: &str = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{"area_numbe":"32","community":"LOOP"},"geometry":null}]}"#;

    #[tokio::test]
    async fn community_areas_fall_back_to_secondary_export() {
        let base = serve(vec![
            NOT_FOUND.to_string(),
            ok_response("application/json", COLLECTION),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let config = DownloadConfig {
            community_areas_url: format!("{base}/api/geospatial/cauq-8yn6"),
            community_areas_fallback_url: format!("{base}/resource/igwz-8jzy.geojson"),
            ..DownloadConfig::default()
        };

        let count = download_community_areas(&reqwest::Client::new(), &config, &paths, false)
            .await
            .unwrap();

        assert_eq!(count, Some(1));
        let saved = std::fs::read_to_string(paths.community_areas_geojson()).unwrap();
        assert!(saved.contains("LOOP"));
    }

    #[tokio::test]
    async fn community_areas_fail_when_every_source_fails() {
        let base = serve(vec![NOT_FOUND.to_string(), NOT_FOUND.to_string()]).await;
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let config = DownloadConfig {
            community_areas_url: format!("{base}/a"),
            community_areas_fallback_url: format!("{base}/b"),
            ..DownloadConfig::default()
        };

        let result = download_community_areas(&reqwest::Client::new(), &config, &paths, false).await;

        assert!(matches!(result, Err(SourceError::Status { .. })));
        assert!(!paths.community_areas_geojson().exists());
    }

    #[test]
    fn accepts_feature_collection() {
        let body = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},"geometry":null}]}"#;
        assert_eq!(feature_count(body).unwrap(), 1);
    }

    #[test]
    fn rejects_empty_collection() {
        let body = r#"{"type":"FeatureCollection","features":[]}"#;
        assert!(feature_count(body).is_err());
    }

    #[test]
    fn rejects_error_envelope() {
        let body = r#"{"error":true,"message":"not found"}"#;
        assert!(matches!(
            feature_count(body),
            Err(SourceError::Normalization { .. })
        ));
    }

    #[test]
    fn partial_path_is_a_sibling() {
        assert_eq!(
            partial_path(Path::new("data/raw/chicago.osm.pbf")),
            PathBuf::from("data/raw/chicago.osm.pbf.part")
        );
    }

    #[test]
    fn existing_output_is_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crashes.csv");
        std::fs::write(&path, "x\n").unwrap();
        assert!(already_present(&path, false));
        assert!(!already_present(&path, true));
        assert!(!already_present(&dir.path().join("missing.csv"), false));
    }
}
