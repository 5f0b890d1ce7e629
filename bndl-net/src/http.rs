// bndl-net/src/http.rs
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bndl_common::error::{
    BndlError, FailureKind, Result, TransportFailure, UnavailableReason,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::validation::verify_checksum;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "bndl bundle engine (Rust)";

/// Builds the blocking client every remote call goes through. `timeout`
/// bounds each request end to end.
pub fn build_http_client(timeout: Duration, bearer_token: Option<&str>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    if let Some(token) = bearer_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| BndlError::Config(format!("invalid bearer token: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| BndlError::Config(format!("failed to build HTTP client: {e}")))
}

fn classify_request_error(url: &str, err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::timeout(format!("request to {url} timed out: {err}"))
    } else {
        TransportFailure::unreachable(format!("HTTP request failed for {url}: {err}"))
    }
}

fn classify_status(url: &str, status: StatusCode, body: &str) -> TransportFailure {
    match status {
        StatusCode::NOT_FOUND => TransportFailure::not_found(format!("{url} returned 404")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportFailure::new(
            FailureKind::Unavailable(UnavailableReason::CredentialsRejected),
            format!("{url} returned {status}"),
        ),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            TransportFailure::timeout(format!("{url} returned {status}"))
        }
        _ => TransportFailure::unreachable(format!("HTTP error {status} for URL {url}: {body}")),
    }
}

/// `timeout` overrides the client's own budget for this request.
fn send(
    client: &Client,
    url: &str,
    timeout: Option<Duration>,
) -> std::result::Result<Response, TransportFailure> {
    debug!("GET {}", url);
    let mut request = client.get(url);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    let response = request
        .send()
        .map_err(|e| classify_request_error(url, &e))?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "Failed to read response body".to_string());
    if status != StatusCode::NOT_FOUND {
        error!("HTTP error {} for URL {}: {}", status, url, body);
    }
    Err(classify_status(url, status, &body))
}

/// GETs `url` and decodes the JSON body.
pub fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    timeout: Option<Duration>,
) -> std::result::Result<T, TransportFailure> {
    let response = send(client, url, timeout)?;
    let text = response.text().map_err(|e| classify_request_error(url, &e))?;
    serde_json::from_str(&text).map_err(|e| {
        TransportFailure::corrupt(format!("unexpected response from {url}: {e}"))
    })
}

/// Streams `url` into `final_path`, verifying the SHA-256 digest when one
/// is given. The body lands in a sibling temp file first and is only
/// renamed into place once verified.
pub fn download_to_file(
    client: &Client,
    url: &str,
    final_path: &Path,
    sha256_expected: Option<&str>,
    timeout: Option<Duration>,
) -> std::result::Result<PathBuf, TransportFailure> {
    let temp_filename = format!(
        ".{}.download",
        final_path.file_name().unwrap_or_default().to_string_lossy()
    );
    let temp_path = final_path.with_file_name(temp_filename);
    debug!("Downloading {} to temporary path: {}", url, temp_path.display());
    if temp_path.exists() {
        if let Err(e) = fs::remove_file(&temp_path) {
            warn!(
                "Could not remove existing temporary file {}: {}",
                temp_path.display(),
                e
            );
        }
    }

    let mut response = send(client, url, timeout)?;
    let mut temp_file = File::create(&temp_path).map_err(|e| {
        TransportFailure::local_io(format!(
            "failed to create temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;
    let written = io::copy(&mut response, &mut temp_file).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        if e.kind() == io::ErrorKind::TimedOut {
            TransportFailure::timeout(format!("reading {url} timed out: {e}"))
        } else {
            TransportFailure::unreachable(format!("failed to read body of {url}: {e}"))
        }
    })?;
    drop(temp_file);
    debug!("Finished writing {} bytes to temp file.", written);

    match sha256_expected.filter(|s| !s.is_empty()) {
        Some(expected) => {
            if let Err(e) = verify_checksum(&temp_path, expected) {
                let _ = fs::remove_file(&temp_path);
                return Err(e);
            }
            debug!("Checksum verified for temporary file: {}", temp_path.display());
        }
        None => debug!(
            "Skipping checksum verification for {} - none provided.",
            temp_path.display()
        ),
    }

    fs::rename(&temp_path, final_path).map_err(|e| {
        TransportFailure::local_io(format!(
            "failed to move temp file {} to {}: {}",
            temp_path.display(),
            final_path.display(),
            e
        ))
    })?;
    debug!("Moved downloaded file to final location: {}", final_path.display());
    Ok(final_path.to_path_buf())
}
