//! Mapping of transport and status failures onto `BackendError`.
use std::time::Duration;

use ragline_core::error::BackendError;
use reqwest::{Response, StatusCode};

pub fn client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::Unavailable(format!("http client: {e}")))
}

pub fn transport_error(e: reqwest::Error, timeout: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(timeout)
    } else if e.is_decode() {
        BackendError::Malformed(e.to_string())
    } else {
        BackendError::Unavailable(e.to_string())
    }
}

/// Passes 2xx responses through; everything else becomes an error carrying
/// the start of the response body.
pub async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: String = response.text().await.unwrap_or_default().chars().take(200).collect();
    let message = format!("HTTP {status}: {body}");
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited(message),
        s if s.is_server_error() => BackendError::Unavailable(message),
        _ => BackendError::Malformed(message),
    })
}
