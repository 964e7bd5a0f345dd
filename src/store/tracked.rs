//! Tracked-file CRUD operations.

use crate::error::StoreError;
use crate::{Error, Result};

use super::{TrackedFile, TrackedFileRow, TrackingStore};

impl TrackingStore {
    /// Insert or update one tracked file.
    ///
    /// Upserts on `(feed_id, file_name)`, so re-recording a file after a
    /// repair download simply refreshes its size, hash, and timestamp.
    pub async fn upsert_file(&self, file: &TrackedFile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_files (feed_id, file_name, title, size_bytes, sha256, downloaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (feed_id, file_name) DO UPDATE SET
                title = excluded.title,
                size_bytes = excluded.size_bytes,
                sha256 = excluded.sha256,
                downloaded_at = excluded.downloaded_at
            "#,
        )
        .bind(&file.feed_id)
        .bind(&file.file_name)
        .bind(&file.title)
        .bind(file.size_bytes as i64)
        .bind(&file.sha256)
        .bind(file.downloaded_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to upsert tracked file: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get one tracked file by feed and filename
    pub async fn get_file(&self, feed_id: &str, file_name: &str) -> Result<Option<TrackedFile>> {
        let row = sqlx::query_as::<_, TrackedFileRow>(
            r#"
            SELECT feed_id, file_name, title, size_bytes, sha256, downloaded_at
            FROM tracked_files
            WHERE feed_id = ? AND file_name = ?
            "#,
        )
        .bind(feed_id)
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to get tracked file: {}",
                e
            )))
        })?;

        Ok(row.map(TrackedFile::from))
    }

    /// Whether a file is already recorded for a feed
    pub async fn contains(&self, feed_id: &str, file_name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tracked_files WHERE feed_id = ? AND file_name = ?",
        )
        .bind(feed_id)
        .bind(file_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to check tracked file: {}",
                e
            )))
        })?;

        Ok(count > 0)
    }

    /// Remove one tracked file. Returns whether a row was deleted.
    pub async fn remove_file(&self, feed_id: &str, file_name: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM tracked_files WHERE feed_id = ? AND file_name = ?",
        )
        .bind(feed_id)
        .bind(file_name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to remove tracked file: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// All tracked files for one feed, in filename order
    pub async fn files_for_feed(&self, feed_id: &str) -> Result<Vec<TrackedFile>> {
        let rows = sqlx::query_as::<_, TrackedFileRow>(
            r#"
            SELECT feed_id, file_name, title, size_bytes, sha256, downloaded_at
            FROM tracked_files
            WHERE feed_id = ?
            ORDER BY file_name ASC
            "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to list tracked files: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(TrackedFile::from).collect())
    }

    /// All tracked files across every feed, grouped by feed then filename
    pub async fn all_files(&self) -> Result<Vec<TrackedFile>> {
        let rows = sqlx::query_as::<_, TrackedFileRow>(
            r#"
            SELECT feed_id, file_name, title, size_bytes, sha256, downloaded_at
            FROM tracked_files
            ORDER BY feed_id ASC, file_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Store(StoreError::QueryFailed(format!(
                "Failed to list all tracked files: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(TrackedFile::from).collect())
    }
}
