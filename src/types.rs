//! Core types and events for podsync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One remote entry resolved from a feed.
///
/// Produced fresh on every feed fetch and discarded after the run;
/// never persisted directly.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedItem {
    /// Item title as published by the feed
    pub title: String,

    /// Enclosure (payload) URL
    pub enclosure_url: String,

    /// Byte length declared by the feed, if any
    pub declared_length: Option<u64>,

    /// Publication timestamp (published, falling back to updated)
    pub published_at: Option<DateTime<Utc>>,
}

/// Ephemeral unit of work: one feed item bound to its destination path.
#[derive(Clone, Debug)]
pub struct SyncTask {
    /// Feed this task belongs to
    pub feed_id: String,

    /// The remote item being synchronized
    pub item: FeedItem,

    /// Local filename (no directory component)
    pub file_name: String,

    /// Full destination path on disk
    pub target_path: PathBuf,

    /// Authoritative expected size, when one could be resolved
    pub expected_size: Option<u64>,
}

/// Outcome of processing one [`SyncTask`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// Local copy was already complete, no I/O performed
    Skipped,
    /// Item was fetched and recorded in the tracking store
    Downloaded,
    /// All download attempts were exhausted
    Failed {
        /// Description of the last error
        reason: String,
    },
}

/// One entry in the failure list of a [`SyncReport`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDownload {
    /// Item title
    pub title: String,

    /// Enclosure URL that failed
    pub url: String,

    /// Destination path the download was writing to
    pub target_path: PathBuf,
}

/// Aggregated result of one sync run, returned by value.
///
/// Replaces the shared running totals of earlier designs; callers own
/// aggregation across runs if they need it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Number of items fetched this run
    pub downloaded: usize,

    /// Number of items whose local copy was already complete
    pub skipped: usize,

    /// Number of items that exhausted their retry budget
    pub failed: usize,

    /// Enumerated failures for reporting
    pub failures: Vec<FailedDownload>,
}

impl SyncReport {
    /// Fold another report into this one (used when aggregating across feeds)
    pub fn merge(&mut self, other: SyncReport) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }
}

/// Result of a square-up pass over one or more directories
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Untracked on-disk files that gained a tracking row
    pub added: usize,

    /// Tracking rows dropped because the backing file is gone
    pub removed: usize,

    /// Paths that could not be inspected (permission denied, etc.)
    pub skipped_paths: Vec<PathBuf>,
}

impl ReconcileReport {
    /// Fold another report into this one
    pub fn merge(&mut self, other: ReconcileReport) {
        self.added += other.added;
        self.removed += other.removed;
        self.skipped_paths.extend(other.skipped_paths);
    }
}

/// Event emitted during a sync run.
///
/// Consumers subscribe via [`crate::sync::SyncOrchestrator::subscribe`]
/// and own how (or whether) events are rendered.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A feed's pass started
    FeedStarted {
        /// Feed identity
        feed_id: String,
        /// Number of items selected for processing after filtering/sorting
        items: usize,
    },

    /// A feed's pass finished
    FeedFinished {
        /// Feed identity
        feed_id: String,
        /// Per-feed report
        report: SyncReport,
    },

    /// A feed's pass was aborted (feed unavailable); the run continues
    FeedFailed {
        /// Feed identity
        feed_id: String,
        /// Error message
        error: String,
    },

    /// A download started
    TaskStarted {
        /// Feed identity
        feed_id: String,
        /// Local filename
        file_name: String,
    },

    /// Chunk-level download progress
    Progress {
        /// Feed identity
        feed_id: String,
        /// Local filename
        file_name: String,
        /// Bytes written so far this attempt
        bytes_so_far: u64,
        /// Total bytes expected, when the server declared a length
        total_bytes: Option<u64>,
        /// Time elapsed since the attempt started
        #[serde(with = "duration_secs_f64")]
        elapsed: Duration,
    },

    /// A task reached a terminal state
    TaskFinished {
        /// Feed identity
        feed_id: String,
        /// Local filename
        file_name: String,
        /// Terminal outcome
        outcome: DownloadOutcome,
    },
}

mod duration_secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
