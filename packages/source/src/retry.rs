//! HTTP retry helpers for transient errors.
//!
//! Every request in this crate goes through [`send_text`] or
//! [`send_streaming`] instead of calling `reqwest::RequestBuilder::send()`
//! directly, so each one retries with exponential backoff on timeouts,
//! connection resets, HTTP 429, and HTTP 5xx.
//!
//! ```ignore
//! let csv = retry::send_text(|| client.get(&url).query(&params)).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Maximum number of retry attempts for transient HTTP errors.
///
/// With exponential backoff (2s, 4s, 8s, 16s, 32s) the total wait
/// before giving up is 62 seconds.
const MAX_RETRIES: u32 = 5;

/// Maximum number of full re-fetch attempts when the response body
/// cannot be read (truncated transfer, reset mid-body).
const MAX_BODY_RETRIES: u32 = 3;

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server answers with a non-retryable status, or the body cannot be
/// read after all body retries.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(build_request: F) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;
    loop {
        let response = send_inner(&build_request, MAX_RETRIES).await?;
        let url = response.url().to_string();
        let status = response.status();

        match response.text().await {
            Ok(text) => return Ok(text),
            Err(e) if body_attempt < MAX_BODY_RETRIES => {
                body_attempt += 1;
                let delay = Duration::from_secs(1u64 << body_attempt);
                log::warn!(
                    "Body read failed (body retry {body_attempt}/{MAX_BODY_RETRIES}), \
                     re-fetching in {delay:?}...\n  url: {url}\n  status: {status}\n  error: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                log::error!(
                    "Body read failed after {MAX_BODY_RETRIES} retries, giving up.\n  \
                     url: {url}\n  status: {status}\n  error: {e}"
                );
                return Err(SourceError::Http(e));
            }
        }
    }
}

/// Sends an HTTP request and returns the successful response for the
/// caller to stream.
///
/// Only connection establishment and status are retried; a failure
/// mid-stream is the caller's to handle.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries or the
/// server answers with a non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send_streaming<F>(build_request: F) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    send_inner(&build_request, MAX_RETRIES).await
}

/// Core retry loop shared by [`send_text`] and [`send_streaming`].
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    max_retries: u32,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt); // 2s, 4s, 8s
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) && attempt < max_retries => {
                log::warn!("  transient error: {e}");
                continue;
            }
            Err(e) => return Err(SourceError::Http(e)),
        };

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => return Ok(response),
            StatusClass::Retryable if attempt < max_retries => {
                log::warn!("  HTTP {status} (retryable)");
            }
            StatusClass::Retryable => {
                return Err(SourceError::Status {
                    url: response.url().to_string(),
                    message: format!("HTTP {status} after {max_retries} retries"),
                });
            }
            StatusClass::Permanent => {
                return Err(SourceError::Status {
                    url: response.url().to_string(),
                    message: format!("HTTP {status}"),
                });
            }
        }
    }

    Err(SourceError::Normalization {
        message: "request failed after all retries".to_string(),
    })
}

/// How a response status is handled by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    Retryable,
    Permanent,
}

/// 429 and 5xx are retried; other 4xx are permanent.
fn classify_status(status: reqwest::StatusCode) -> StatusClass {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Retryable
    } else if status.is_client_error() {
        StatusClass::Permanent
    } else {
        StatusClass::Success
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
