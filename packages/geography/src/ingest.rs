//! Tract boundary and ACS downloads from the Census Bureau.
//!
//! Tract polygons come from the `TIGERweb` `ArcGIS` REST service as
//! `GeoJSON`; demographics come from the ACS 5-year data API, which
//! answers with a JSON array of arrays that is written out as CSV.

use std::path::Path;

use crash_hotspots_config::paths::ensure_parent;
use crash_hotspots_geography_models::ACS_VARIABLES;

use crate::GeoError;

/// Page size for `TIGERweb` paginated requests. Kept low to avoid WAF
/// blocks on large geospatial responses.
const TIGERWEB_PAGE_SIZE: u32 = 100;

/// Maximum retry attempts per page request.
const TIGERWEB_MAX_RETRIES: u32 = 5;

/// `TIGERweb` census tract layer of the ACS 2023 map service.
const TIGERWEB_TRACTS_URL: &str =
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/tigerWMS_ACS2023/MapServer/8/query";

/// Browser-like User-Agent to avoid WAF blocks on `TIGERweb`.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; CrashHotspots/0.1)";

/// Builds a `reqwest::Client` configured for Census Bureau requests.
///
/// # Errors
///
/// Returns [`GeoError`] if the client cannot be built.
pub fn build_client() -> Result<reqwest::Client, GeoError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(Into::into)
}

// ============================================================
// Paginated TIGERweb fetcher
// ============================================================

/// Fetches all features from a `TIGERweb` query using paginated requests
/// (`resultOffset` + `resultRecordCount`).
///
/// # Errors
///
/// Returns [`GeoError`] if all retry attempts are exhausted for any page.
async fn fetch_tigerweb_paginated(
    client: &reqwest::Client,
    base_url: &str,
    label: &str,
) -> Result<Vec<serde_json::Value>, GeoError> {
    let mut all_features: Vec<serde_json::Value> = Vec::new();
    let mut offset = 0u32;

    loop {
        let sep = if base_url.contains('?') { '&' } else { '?' };
        let url =
            format!("{base_url}{sep}resultRecordCount={TIGERWEB_PAGE_SIZE}&resultOffset={offset}");

        let json =
            fetch_tigerweb_page_with_retry(client, &url, label, offset, TIGERWEB_MAX_RETRIES)
                .await?;

        let features = json["features"]
            .as_array()
            .ok_or_else(|| GeoError::Conversion {
                message: format!(
                    "No features array in TIGERweb response for {label} (offset={offset})"
                ),
            })?;

        if features.is_empty() {
            break;
        }

        #[allow(clippy::cast_possible_truncation)]
        let page_len = features.len() as u32;

        all_features.extend(features.iter().cloned());

        // ArcGIS sets exceededTransferLimit=true when more pages exist
        let exceeded = json
            .get("exceededTransferLimit")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        if !exceeded {
            break;
        }

        offset += page_len;
        log::info!(
            "{label}: fetched {page_len} features (total so far: {}), fetching next page...",
            all_features.len()
        );

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    Ok(all_features)
}

/// Truncates a string for logging, appending "..." if it exceeds `max_len`.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let cut = (0..=max_len)
            .rev()
            .find(|&i| s.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &s[..cut])
    }
}

/// Fetches a single page from `TIGERweb` with exponential backoff.
async fn fetch_tigerweb_page_with_retry(
    client: &reqwest::Client,
    url: &str,
    label: &str,
    offset: u32,
    max_retries: u32,
) -> Result<serde_json::Value, GeoError> {
    let mut last_error = String::new();

    for attempt in 0..max_retries {
        if attempt > 0 {
            let delay_secs = 1u64 << (attempt + 1);
            log::warn!(
                "{label} (offset={offset}): retry {attempt}/{max_retries} in {delay_secs}s..."
            );
            tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
        }

        let resp = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = format!("HTTP request error: {e}");
                log::warn!("{label} (offset={offset}, attempt {attempt}): {last_error}");
                continue;
            }
        };

        let status = resp.status();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => {
                last_error = format!("Failed to read response body: {e}");
                log::warn!("{label} (offset={offset}, attempt {attempt}): {last_error}");
                continue;
            }
        };

        if !status.is_success() {
            last_error = format!("HTTP {status}");
            log::warn!(
                "{label} (offset={offset}, attempt {attempt}): {last_error}. Response body: {}",
                truncate_for_log(&body, 500)
            );
            if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
                break;
            }
            continue;
        }

        let json: serde_json::Value = match serde_json::from_str(&body) {
            Ok(j) => j,
            Err(e) => {
                last_error = format!("JSON parse error: {e}");
                log::warn!(
                    "{label} (offset={offset}, attempt {attempt}): {last_error}. Response body: {}",
                    truncate_for_log(&body, 500)
                );
                continue;
            }
        };

        // ArcGIS error envelope: {"error": {"code": 500, "message": "..."}}
        if let Some(error_obj) = json.get("error") {
            let code = error_obj
                .get("code")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0);
            let msg = error_obj
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown");
            last_error = format!("ArcGIS error {code}: {msg}");
            log::warn!("{label} (offset={offset}, attempt {attempt}): {last_error}");
            continue;
        }

        return Ok(json);
    }

    Err(GeoError::Conversion {
        message: format!(
            "TIGERweb request failed after {max_retries} attempts for {label} (offset={offset}): {last_error}"
        ),
    })
}

/// Wraps features into a `GeoJSON` `FeatureCollection`.
fn feature_collection(features: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

fn write_bytes(dest: &Path, bytes: &[u8]) -> Result<(), GeoError> {
    let io_err = |source| GeoError::Io {
        path: dest.display().to_string(),
        source,
    };
    ensure_parent(dest).map_err(io_err)?;
    std::fs::write(dest, bytes).map_err(io_err)
}

/// Downloads tract polygons for one county and writes them as a `GeoJSON`
/// `FeatureCollection` with `GEOID` and `NAME` properties.
///
/// Returns the number of tracts written.
///
/// # Errors
///
/// Returns [`GeoError`] if the download or write fails.
pub async fn download_tracts(
    client: &reqwest::Client,
    state_fips: &str,
    county_fips: &str,
    dest: &Path,
) -> Result<usize, GeoError> {
    let url = format!(
        "{TIGERWEB_TRACTS_URL}\
         ?where=STATE%3D%27{state_fips}%27+AND+COUNTY%3D%27{county_fips}%27\
         &outFields=GEOID,NAME,STATE,COUNTY\
         &outSR=4326\
         &f=geojson\
         &returnGeometry=true"
    );

    let label = format!("tracts for county {state_fips}{county_fips}");
    log::info!("Fetching {label}...");

    let features = fetch_tigerweb_paginated(client, &url, &label).await?;
    let count = features.len();
    if count == 0 {
        return Err(GeoError::Conversion {
            message: format!("TIGERweb returned no {label}"),
        });
    }

    let body = serde_json::to_vec(&feature_collection(features))?;
    write_bytes(dest, &body)?;

    log::info!("Saved {count} tracts to {}", dest.display());
    Ok(count)
}

/// Converts the Census API's array-of-arrays response into CSV text.
///
/// The first inner array is the header. JSON `null` cells become empty
/// fields.
///
/// # Errors
///
/// Returns [`GeoError::Conversion`] if the body is not an array of arrays
/// or rows disagree with the header width.
pub fn acs_response_to_csv(body: &str) -> Result<(String, usize), GeoError> {
    let rows: Vec<Vec<serde_json::Value>> =
        serde_json::from_str(body).map_err(|e| GeoError::Conversion {
            message: format!("Failed to parse ACS response: {e}"),
        })?;

    let Some(width) = rows.first().map(Vec::len) else {
        return Err(GeoError::Conversion {
            message: "ACS response is empty".to_string(),
        });
    };

    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(GeoError::Conversion {
                message: format!("ACS row {i} has {} cells, header has {width}", row.len()),
            });
        }
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => csv_field(s),
                other => other.to_string(),
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }

    Ok((out, rows.len() - 1))
}

/// Quotes a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Downloads tract-level ACS 5-year estimates for every tract in a state.
///
/// The Census API requires a key for bulk tract queries. Without one the
/// download is skipped and `Ok(None)` is returned; demographics are then
/// imputed downstream.
///
/// # Errors
///
/// Returns [`GeoError`] if the request or write fails.
pub async fn download_acs(
    client: &reqwest::Client,
    year: u16,
    state_fips: &str,
    api_key: Option<&str>,
    dest: &Path,
) -> Result<Option<usize>, GeoError> {
    let Some(key) = api_key.filter(|k| !k.trim().is_empty()) else {
        log::warn!("Skipping ACS download: no Census API key configured");
        return Ok(None);
    };

    let url = format!(
        "https://api.census.gov/data/{year}/acs/acs5?get=NAME,{}&for=tract:*&in=state:{state_fips}&key={key}",
        ACS_VARIABLES.join(",")
    );

    log::info!("Fetching ACS {year} 5-year estimates for state FIPS {state_fips}...");
    let resp = client.get(&url).send().await?.error_for_status()?;
    let body = resp.text().await?;

    let (csv_text, count) = acs_response_to_csv(&body)?;
    write_bytes(dest, csv_text.as_bytes())?;

    log::info!("Saved ACS estimates for {count} tracts to {}", dest.display());
    Ok(Some(count))
}
