//! Configuration types for podsync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identity and destination for one feed.
///
/// Owned by configuration; the engine reads it and never mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Unique feed identity, used as the tracking-store key
    pub feed_id: String,

    /// Feed URL (RSS or Atom)
    pub url: String,

    /// Directory downloaded episodes are written to
    pub output_dir: PathBuf,
}

/// Download behavior configuration (timeouts, tolerance, hashing)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// HTTP timeout for GET and HEAD requests (default: 10 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Reject non-HTTPS enclosure URLs (default: false)
    #[serde(default)]
    pub https_only: bool,

    /// Compute SHA-256 during download and write a `.sha256` sidecar
    /// (default: false)
    #[serde(default)]
    pub generate_hash: bool,

    /// Completeness slack in megabytes, absorbing container/tag-length
    /// discrepancies between feed-declared and written sizes (default: 10)
    #[serde(default = "default_tolerance_mb")]
    pub tolerance_mb: u64,

    /// Extension appended to resolved episode filenames (default: "mp3")
    #[serde(default = "default_media_extension")]
    pub media_extension: String,
}

impl DownloadConfig {
    /// Tolerance expressed in bytes
    pub fn tolerance_bytes(&self) -> u64 {
        self.tolerance_mb * 1024 * 1024
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            https_only: false,
            generate_hash: false,
            tolerance_mb: default_tolerance_mb(),
            media_extension: default_media_extension(),
        }
    }
}

/// Retry configuration for transient download failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts per download (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff slept after the first failed attempt (default: 2 seconds)
    #[serde(default = "default_initial_backoff", with = "duration_serde")]
    pub initial_backoff: Duration,

    /// Cap on any single backoff sleep (default: 60 seconds)
    #[serde(default = "default_max_backoff", with = "duration_serde")]
    pub max_backoff: Duration,

    /// Multiplier applied to the backoff after each failure (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to backoff sleeps (default: false, keeping the
    /// backoff ladder deterministic)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

/// Filename resolution mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameMode {
    /// Any bare 6-digit YYMMDD substring in the title becomes an ISO date
    /// prefix
    #[default]
    Default,
    /// Only a trailing 6-digit token is treated as a date; unparseable codes
    /// are kept verbatim as the prefix
    Daily,
}

/// Per-run options controlling item selection and ordering
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Truncate each feed's sorted item list to this many entries
    #[serde(default)]
    pub count: Option<usize>,

    /// Case-insensitive substring filter on item titles, applied before
    /// sorting
    #[serde(default)]
    pub search: Option<String>,

    /// Process oldest items first (default: newest first)
    #[serde(default)]
    pub oldest_first: bool,

    /// Filename resolution mode
    #[serde(default)]
    pub filename_mode: FilenameMode,
}

/// Main configuration for the sync engine.
///
/// Loaded once into an immutable snapshot; changes are written back
/// explicitly with [`Config::write_file`], never mutated in place during
/// a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Feeds to synchronize (feed_id must be unique)
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,

    /// Path of the SQLite tracking store
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry budget and backoff
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration snapshot from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Persist this snapshot as JSON, creating parent directories as needed
    pub fn write_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Config {
                message: format!("failed to create {}: {}", parent.display(), e),
                key: None,
            })?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(|e| Error::Config {
            message: format!("failed to write {}: {}", path.display(), e),
            key: None,
        })?;
        Ok(())
    }

    /// Verify feed identities are unique and non-empty.
    ///
    /// The orchestrator tolerates duplicates at run time by skipping them
    /// with a warning; this is for consumers that want to fail eagerly.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for feed in &self.feeds {
            if feed.feed_id.trim().is_empty() {
                return Err(Error::Config {
                    message: format!("feed with url {} has an empty feed_id", feed.url),
                    key: Some("feed_id".to_string()),
                });
            }
            if !seen.insert(feed.feed_id.as_str()) {
                return Err(Error::Config {
                    message: format!("duplicate feed_id: {}", feed.feed_id),
                    key: Some("feed_id".to_string()),
                });
            }
        }
        Ok(())
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_tolerance_mb() -> u64 {
    10
}

fn default_media_extension() -> String {
    "mp3".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_store_path() -> PathBuf {
    PathBuf::from("podsync.db")
}

// Duration serialization helper (seconds as integer)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
