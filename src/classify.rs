//! Local file completeness classification
//!
//! Combines a filesystem probe with an authoritative-size oracle to decide,
//! per item, whether the local copy is missing, complete, or damaged.
//! Classification never mutates state; deleting a damaged file is the
//! orchestrator's job.

use crate::error::Result;
use crate::types::FeedItem;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Completeness verdict for a local file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileStatus {
    /// No file exists at the path
    Missing,
    /// File exists and is within tolerance of the expected size
    Complete,
    /// File exists but is shorter than `expected - tolerance`
    Damaged,
}

/// Classify a local file against an expected size under a byte tolerance.
///
/// With no expected size an existing file is always `Complete` — damage
/// cannot be judged without a reference size. This means damaged files with
/// no discoverable remote size are never redetected; inherited behavior,
/// kept deliberately since tightening it changes observable skip behavior.
pub fn classify(local_path: &Path, expected_size: Option<u64>, tolerance: u64) -> FileStatus {
    let Some(local_size) = file_size(local_path) else {
        return FileStatus::Missing;
    };

    let Some(expected) = expected_size else {
        return FileStatus::Complete;
    };

    if local_size < expected.saturating_sub(tolerance) {
        FileStatus::Damaged
    } else {
        FileStatus::Complete
    }
}

/// Size of the file at `path`, or `None` if it does not exist or cannot
/// be inspected.
pub fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

/// Path of the hash sidecar belonging to `path`
pub fn sidecar_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".sha256");
    std::path::PathBuf::from(name)
}

/// Compute the hex-encoded SHA-256 of a file, streaming in 8 KiB chunks.
pub fn compute_sha256(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check a file against its `.sha256` sidecar.
///
/// Returns `false` when the sidecar is absent or its digest does not match
/// the file's content.
pub fn sidecar_matches(path: &Path) -> Result<bool> {
    let sidecar = sidecar_path(path);
    if !sidecar.exists() {
        return Ok(false);
    }
    let expected = std::fs::read_to_string(&sidecar)?;
    let actual = compute_sha256(path)?;
    Ok(actual == expected.trim())
}

/// Resolves an item's authoritative expected byte size.
///
/// Prefers the feed-declared length; falls back to a HEAD probe of the
/// enclosure URL. Probe failures yield `None` — absence of size information
/// is a normal, handled case, not a fault.
pub struct SizeOracle {
    client: reqwest::Client,
    timeout: Duration,
}

impl SizeOracle {
    /// Create a size oracle sharing the downloader's timeout budget
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Resolve the expected byte size for one item, if any source has it
    pub async fn resolve(&self, item: &FeedItem) -> Option<u64> {
        if let Some(len) = item.declared_length
            && len > 0
        {
            return Some(len);
        }
        self.probe(&item.enclosure_url).await
    }

    /// HEAD the URL and parse its content-length header
    async fn probe(&self, url: &str) -> Option<u64> {
        let response = match self
            .client
            .head(url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, url, "size probe failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(status = %response.status(), url, "size probe answered non-success");
            return None;
        }

        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|len| *len > 0)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, len: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn missing_file_classifies_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.mp3");
        assert_eq!(classify(&path, Some(1000), 10), FileStatus::Missing);
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();

        // expected 1_000_000, tolerance 1_000: 999_001 is complete
        let ok = write_file(&dir, "ok.mp3", 999_001);
        assert_eq!(classify(&ok, Some(1_000_000), 1_000), FileStatus::Complete);

        // 998_999 falls below expected - tolerance
        let short = write_file(&dir, "short.mp3", 998_999);
        assert_eq!(classify(&short, Some(1_000_000), 1_000), FileStatus::Damaged);

        // exactly expected - tolerance is still complete
        let edge = write_file(&dir, "edge.mp3", 999_000);
        assert_eq!(classify(&edge, Some(1_000_000), 1_000), FileStatus::Complete);
    }

    #[test]
    fn unknown_expected_size_means_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "mystery.mp3", 5);
        assert_eq!(classify(&path, None, 0), FileStatus::Complete);
    }

    #[test]
    fn tolerance_larger_than_expected_never_damages() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "tiny.mp3", 1);
        assert_eq!(classify(&path, Some(100), 1_000), FileStatus::Complete);
    }

    #[test]
    fn sidecar_round_trip_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "ep.mp3", 64);

        let digest = compute_sha256(&path).unwrap();
        std::fs::write(sidecar_path(&path), &digest).unwrap();
        assert!(sidecar_matches(&path).unwrap());
    }

    #[test]
    fn sidecar_mismatch_and_absence_fail_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "ep.mp3", 64);

        assert!(!sidecar_matches(&path).unwrap(), "no sidecar yet");

        std::fs::write(sidecar_path(&path), "deadbeef").unwrap();
        assert!(!sidecar_matches(&path).unwrap(), "wrong digest");
    }

    #[test]
    fn sidecar_tolerates_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "ep.mp3", 16);

        let digest = compute_sha256(&path).unwrap();
        std::fs::write(sidecar_path(&path), format!("{digest}\n")).unwrap();
        assert!(sidecar_matches(&path).unwrap());
    }

    #[tokio::test]
    async fn declared_length_short_circuits_probe() {
        // An unroutable URL proves the probe is never attempted
        let oracle = SizeOracle::new(reqwest::Client::new(), Duration::from_millis(100));
        let item = FeedItem {
            title: "ep".to_string(),
            enclosure_url: "http://127.0.0.1:1/ep.mp3".to_string(),
            declared_length: Some(1234),
            published_at: None,
        };
        assert_eq!(oracle.resolve(&item).await, Some(1234));
    }

    #[tokio::test]
    async fn probe_failure_yields_none() {
        let oracle = SizeOracle::new(reqwest::Client::new(), Duration::from_millis(100));
        let item = FeedItem {
            title: "ep".to_string(),
            enclosure_url: "http://127.0.0.1:1/ep.mp3".to_string(),
            declared_length: None,
            published_at: None,
        };
        assert_eq!(oracle.resolve(&item).await, None);
    }

    #[tokio::test]
    async fn zero_declared_length_falls_through_to_probe() {
        let oracle = SizeOracle::new(reqwest::Client::new(), Duration::from_millis(100));
        let item = FeedItem {
            title: "ep".to_string(),
            enclosure_url: "http://127.0.0.1:1/ep.mp3".to_string(),
            declared_length: Some(0),
            published_at: None,
        };
        // Probe against the unroutable address fails, so None overall
        assert_eq!(oracle.resolve(&item).await, None);
    }
}
