//! Streaming enclosure downloads
//!
//! Fetches one payload URL to disk in fixed-size chunks with bounded retries
//! and exponential backoff. Optionally computes SHA-256 incrementally during
//! the same pass, writes a `.sha256` sidecar, and re-verifies it after close
//! (a mismatch counts as an attempt failure and is retried). Failed attempts
//! overwrite the destination on the next try; only the final failed attempt
//! leaves its partial file behind, for later damage detection.

use crate::classify::{compute_sha256, sidecar_path};
use crate::config::{DownloadConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;
use crate::utils::{format_bytes, format_speed};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Per-chunk progress callback: `(bytes_so_far, total_bytes, elapsed)`
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>, Duration) + Send + Sync);

/// Result of a successful download
#[derive(Clone, Debug)]
pub struct DownloadedFile {
    /// Number of payload bytes written to disk
    pub bytes_written: u64,

    /// Hex-encoded SHA-256 recorded in the sidecar, when hashing was enabled
    pub sha256: Option<String>,
}

/// Streaming downloader with a bounded retry budget
pub struct Downloader {
    client: reqwest::Client,
    download: DownloadConfig,
    retry: RetryConfig,
}

impl Downloader {
    /// Create a downloader over a shared HTTP client
    pub fn new(client: reqwest::Client, download: DownloadConfig, retry: RetryConfig) -> Self {
        Self {
            client,
            download,
            retry,
        }
    }

    /// Download `url` to `dest`, retrying transient failures.
    ///
    /// The HTTPS-only gate is evaluated before the first request; a
    /// violation fails immediately without consuming an attempt.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<DownloadedFile> {
        if self.download.https_only && !is_https(url) {
            return Err(Error::HttpsRequired {
                url: url.to_string(),
            });
        }

        retry_with_backoff(&self.retry, || self.attempt(url, dest, progress)).await
    }

    /// One download attempt: stream the body to disk, hash if configured,
    /// verify the sidecar after close.
    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<DownloadedFile> {
        let start = Instant::now();

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total_bytes = response.content_length().filter(|len| *len > 0);

        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = self.download.generate_hash.then(Sha256::new);
        let mut bytes_written: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            if let Some(h) = hasher.as_mut() {
                h.update(&chunk);
            }
            bytes_written += chunk.len() as u64;
            if let Some(report) = progress {
                report(bytes_written, total_bytes, start.elapsed());
            }
        }
        file.flush().await?;
        drop(file);

        let sha256 = match hasher {
            Some(h) => Some(self.seal_sidecar(dest, format!("{:x}", h.finalize())).await?),
            None => None,
        };

        debug!(
            url,
            dest = %dest.display(),
            size = %format_bytes(bytes_written),
            speed = %format_speed(bytes_written, start.elapsed()),
            "download attempt succeeded"
        );

        Ok(DownloadedFile {
            bytes_written,
            sha256,
        })
    }

    /// Write the sidecar and immediately verify it against the file on disk.
    async fn seal_sidecar(&self, dest: &Path, digest: String) -> Result<String> {
        let sidecar = sidecar_path(dest);
        tokio::fs::write(&sidecar, &digest).await?;

        let actual = compute_sha256(dest)?;
        if actual != digest {
            return Err(Error::IntegrityMismatch {
                path: dest.to_path_buf(),
                expected: digest,
                actual,
            });
        }

        info!(dest = %dest.display(), "sidecar written and verified");
        Ok(digest)
    }
}

/// Whether a URL uses the https scheme. Unparseable URLs fail the check,
/// so https_only mode also rejects them.
fn is_https(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.scheme() == "https")
        .unwrap_or(false)
}
