//! Tracking store for downloaded episodes
//!
//! SQLite persistence of which files each feed already has locally. Keyed by
//! `(feed_id, file_name)` so one feed's sync pass can update its own rows
//! without touching anything another feed owns.
//!
//! ## Submodules
//!
//! Methods on [`TrackingStore`] are organized by domain:
//! - [`migrations`] — Store lifecycle, schema migrations
//! - [`tracked`] — Tracked-file CRUD

use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod tracked;

/// A file a feed is known to have downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Feed this file belongs to
    pub feed_id: String,
    /// Local filename, extension included
    pub file_name: String,
    /// Item title as published by the feed (or the filename stem when the
    /// row was synthesized during square-up)
    pub title: String,
    /// Size in bytes at the time it was recorded
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 digest, when hashing was enabled
    pub sha256: Option<String>,
    /// When the file was recorded
    pub downloaded_at: DateTime<Utc>,
}

/// Tracked-file record from the database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
struct TrackedFileRow {
    /// Feed this file belongs to
    pub feed_id: String,
    /// Local filename, extension included
    pub file_name: String,
    /// Item title
    pub title: String,
    /// Size in bytes at the time it was recorded
    pub size_bytes: i64,
    /// Hex-encoded SHA-256 digest, when hashing was enabled
    pub sha256: Option<String>,
    /// Unix timestamp when the file was recorded
    pub downloaded_at: i64,
}

impl From<TrackedFileRow> for TrackedFile {
    fn from(row: TrackedFileRow) -> Self {
        use chrono::TimeZone;

        TrackedFile {
            feed_id: row.feed_id,
            file_name: row.file_name,
            title: row.title,
            size_bytes: row.size_bytes as u64,
            sha256: row.sha256,
            downloaded_at: Utc
                .timestamp_opt(row.downloaded_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Store handle over the tracking database
pub struct TrackingStore {
    pool: SqlitePool,
}
