//! HTTP client wrapper for streaming, resumable downloads.
//!
//! This module provides the `HttpClient` struct which handles one streaming
//! download attempt: ranged resume of a partial file, chunk-by-chunk
//! progress reporting, cooperative cancellation, and an atomic rename of
//! the temporary file into its final path on verified success.
//!
//! # Filesystem contract
//!
//! Bytes are streamed to `<dest>.part` and the final path appears only via
//! rename after the byte count is verified, so a crash or cancellation
//! never leaves a file at the final path that looks complete but isn't. A
//! leftover `.part` file is the resume point for the next attempt.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, RANGE, RETRY_AFTER};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::cancel::CancelToken;
use super::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS};
use super::error::DownloadError;

/// Suffix appended to the destination path while a transfer is in flight.
const PART_SUFFIX: &str = "part";

/// Outcome of one completed fetch attempt.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Final output path.
    pub path: PathBuf,
    /// Total file size after the transfer.
    pub bytes_downloaded: u64,
    /// Expected total size when the server advertised one.
    pub content_length: Option<u64>,
    /// Whether an HTTP range resume was used.
    pub resumed: bool,
}

/// Result of one fetch attempt that did not error.
#[derive(Debug)]
pub enum FetchResult {
    /// The file was fully transferred, verified, and renamed into place.
    Complete(FetchOutcome),
    /// Cancellation was observed mid-stream; the partial file is left in
    /// place for a future resume.
    Canceled,
}

/// HTTP client for streaming downloads.
///
/// Designed to be created once and shared: the underlying reqwest client
/// pools connections, with a per-host idle ceiling matching the engine's
/// admission pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with default timeouts and per-host pooling.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_config(
            DEFAULT_CONNECT_TIMEOUT_SECS,
            DEFAULT_READ_TIMEOUT_SECS,
            10,
        )
    }

    /// Creates a client with explicit timeouts and per-host idle ceiling.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_config(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
        max_idle_per_host: usize,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .pool_max_idle_per_host(max_idle_per_host)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Performs one streaming download attempt of `url` into `dest_path`.
    ///
    /// When `resume` is set and a partial file exists, a ranged request
    /// continues from its byte length and appends; otherwise the partial is
    /// truncated and the transfer restarts. `on_chunk` is invoked after
    /// every chunk with cumulative bytes and the advertised total, and the
    /// cancellation token is polled at the same granularity.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails,
    /// the server returns an error status, disk writes fail, or the final
    /// byte count does not match the advertised total.
    #[instrument(skip(self, cancel, on_chunk), fields(url = %url))]
    pub async fn fetch(
        &self,
        url: &str,
        dest_path: &Path,
        resume: bool,
        cancel: &CancelToken,
        mut on_chunk: impl FnMut(u64, Option<u64>),
    ) -> Result<FetchResult, DownloadError> {
        // Validate URL before touching the filesystem.
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url.to_string()))?;

        let part_path = part_path_for(dest_path);

        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent.to_path_buf(), e))?;
        }

        let existing_bytes = if resume {
            tokio::fs::metadata(&part_path)
                .await
                .map(|meta| meta.len())
                .unwrap_or(0)
        } else {
            0
        };

        let range_value = (existing_bytes > 0).then(|| format!("bytes={existing_bytes}-"));
        // Waiting on the response is itself interruptible by a stop request.
        let response = tokio::select! {
            response = self.send_get(url, range_value.as_deref()) => response?,
            () = cancel.cancelled() => {
                debug!("request canceled before response arrived");
                return Ok(FetchResult::Canceled);
            }
        };
        let status = response.status().as_u16();

        // Only a 206 answer honors the range; a 200 means the server sent
        // the whole body and the partial must be discarded.
        let appending = existing_bytes > 0 && status == 206;
        let base_bytes = if appending { existing_bytes } else { 0 };
        let content_length = total_content_length(&response, base_bytes);

        let mut file = if appending {
            OpenOptions::new()
                .append(true)
                .open(&part_path)
                .await
                .map_err(|e| DownloadError::io(part_path.clone(), e))?
        } else {
            File::create(&part_path)
                .await
                .map_err(|e| DownloadError::io(part_path.clone(), e))?
        };

        let streamed = stream_body(response, &mut file, url, &part_path, cancel, |written| {
            on_chunk(base_bytes + written, content_length);
        })
        .await?;

        let Some(bytes_written) = streamed else {
            // Canceled mid-stream: keep the partial for a future resume.
            debug!(path = %part_path.display(), "stream canceled, partial kept");
            return Ok(FetchResult::Canceled);
        };

        let final_size = base_bytes.saturating_add(bytes_written);

        if let Some(expected) = content_length
            && expected != final_size
        {
            return Err(DownloadError::integrity(
                part_path.clone(),
                expected,
                final_size,
            ));
        }

        // Verified complete: the final path appears atomically.
        tokio::fs::rename(&part_path, dest_path)
            .await
            .map_err(|e| DownloadError::io(dest_path.to_path_buf(), e))?;

        info!(
            path = %dest_path.display(),
            bytes = final_size,
            resumed = appending,
            "download complete"
        );

        Ok(FetchResult::Complete(FetchOutcome {
            path: dest_path.to_path_buf(),
            bytes_downloaded: final_size,
            content_length,
            resumed: appending,
        }))
    }

    async fn send_get(
        &self,
        url: &str,
        range_header: Option<&str>,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(range) = range_header {
            request = request.header(RANGE, range);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status,
                retry_after,
            ));
        }

        Ok(response)
    }
}

/// Streams the response body to `file` in chunks.
///
/// Returns `Ok(Some(bytes_written))` on a complete stream and `Ok(None)`
/// when cancellation was observed; the buffered writer is flushed in both
/// cases so the partial file length is accurate.
async fn stream_body(
    response: reqwest::Response,
    file: &mut File,
    url: &str,
    file_path: &Path,
    cancel: &CancelToken,
    mut on_chunk: impl FnMut(u64),
) -> Result<Option<u64>, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        // A stalled read must not outlive a stop request.
        let next = tokio::select! {
            chunk = stream.next() => chunk,
            () = cancel.cancelled() => None,
        };

        let Some(chunk_result) = next else {
            break;
        };

        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
        on_chunk(bytes_written);

        if cancel.is_cancelled() {
            break;
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    if cancel.is_cancelled() {
        return Ok(None);
    }
    Ok(Some(bytes_written))
}

/// Returns the in-flight temporary path for a destination.
fn part_path_for(dest_path: &Path) -> PathBuf {
    let mut name = dest_path.file_name().map_or_else(
        || std::ffi::OsString::from("download"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".");
    name.push(PART_SUFFIX);
    dest_path.with_file_name(name)
}

/// Derives the expected total file size from the response.
///
/// For a 206 answer the Content-Length covers only the remainder, so the
/// already-present bytes are added back in.
fn total_content_length(response: &reqwest::Response, existing_bytes: u64) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|remaining| remaining.saturating_add(existing_bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path_appends_suffix() {
        let part = part_path_for(Path::new("/downloads/Rel-18/spec.pdf"));
        assert_eq!(part, PathBuf::from("/downloads/Rel-18/spec.pdf.part"));
    }

    #[test]
    fn test_part_path_handles_missing_file_name() {
        let part = part_path_for(Path::new("/"));
        assert!(part.to_string_lossy().ends_with(".part"));
    }

    #[test]
    fn test_client_default_builds() {
        let _client = HttpClient::new();
    }
}
