//! Input acquisition: download animation bytes by URL.
//!
//! Download failures are reported distinctly from decode failures so the
//! caller can tell "the URL was bad" apart from "the bytes were bad".

use crate::error::PipelineError;
use std::time::Duration;

/// Only the initial download is bounded; inference calls rely on the
/// inference service's own limits.
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 10;

/// Build the client used for GIF downloads.
pub fn download_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .build()
}

/// GET the URL and return the body bytes. A transport error or non-2xx
/// status is a `Download` error.
pub async fn fetch_gif(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, PipelineError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| PipelineError::Download(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(PipelineError::Download(format!("HTTP {}", resp.status())));
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| PipelineError::Download(e.to_string()))?;
    Ok(bytes.to_vec())
}
