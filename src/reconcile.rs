//! Store/disk square-up
//!
//! Brings the tracking store back in line with what is actually on disk:
//! media files present in a feed's output directory but unknown to the store
//! gain a row, and rows whose backing file has disappeared are dropped.
//! Useful after manual file management or a restored backup.

use crate::classify::{compute_sha256, file_size};
use crate::config::{DownloadConfig, FeedConfig};
use crate::error::Result;
use crate::store::{TrackedFile, TrackingStore};
use crate::types::ReconcileReport;
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Reconciles tracking rows against the filesystem
pub struct Reconciler<'a> {
    store: &'a TrackingStore,
    download: DownloadConfig,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler over an open tracking store
    pub fn new(store: &'a TrackingStore, download: DownloadConfig) -> Self {
        Self { store, download }
    }

    /// Square up one feed's directory against its tracking rows.
    ///
    /// A missing output directory leaves the feed's rows untouched rather
    /// than treating every file as deleted; an unmounted volume must not
    /// wipe the tracking history.
    pub async fn reconcile_feed(&self, feed: &FeedConfig) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        if !feed.output_dir.is_dir() {
            warn!(
                feed_id = %feed.feed_id,
                dir = %feed.output_dir.display(),
                "output directory missing, leaving tracking rows untouched"
            );
            return Ok(report);
        }

        let wanted_ext = self.download.media_extension.as_str();
        let mut on_disk = HashSet::new();

        // Recursive walk; rows stay keyed by bare filename, so identically
        // named files in different subdirectories collapse to one row
        for entry in WalkDir::new(&feed.output_dir).min_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.to_path_buf())
                        .unwrap_or_else(|| feed.output_dir.clone());
                    warn!(error = %e, path = %path.display(), "skipping unreadable path");
                    report.skipped_paths.push(path);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(wanted_ext) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                report.skipped_paths.push(path.to_path_buf());
                continue;
            };

            on_disk.insert(file_name.to_string());

            if self.store.contains(&feed.feed_id, file_name).await? {
                continue;
            }

            let Some(size_bytes) = file_size(path) else {
                report.skipped_paths.push(path.to_path_buf());
                continue;
            };

            let sha256 = if self.download.generate_hash {
                match compute_sha256(path) {
                    Ok(digest) => Some(digest),
                    Err(e) => {
                        warn!(error = %e, path = %path.display(), "could not hash file");
                        report.skipped_paths.push(path.to_path_buf());
                        continue;
                    }
                }
            } else {
                None
            };

            // Square-up has no feed item to take a title from; the stem is
            // the best available stand-in
            let title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file_name)
                .to_string();

            debug!(feed_id = %feed.feed_id, file_name, "adopting untracked file");
            self.store
                .upsert_file(&TrackedFile {
                    feed_id: feed.feed_id.clone(),
                    file_name: file_name.to_string(),
                    title,
                    size_bytes,
                    sha256,
                    downloaded_at: Utc::now(),
                })
                .await?;
            report.added += 1;
        }

        // Drop rows whose backing file is gone
        for tracked in self.store.files_for_feed(&feed.feed_id).await? {
            if !on_disk.contains(&tracked.file_name)
                && self
                    .store
                    .remove_file(&feed.feed_id, &tracked.file_name)
                    .await?
            {
                debug!(
                    feed_id = %feed.feed_id,
                    file_name = %tracked.file_name,
                    "dropping row for deleted file"
                );
                report.removed += 1;
            }
        }

        info!(
            feed_id = %feed.feed_id,
            added = report.added,
            removed = report.removed,
            skipped = report.skipped_paths.len(),
            "reconcile pass finished"
        );
        Ok(report)
    }

    /// Square up every configured feed, aggregating the per-feed reports
    pub async fn reconcile_all(&self, feeds: &[FeedConfig]) -> Result<ReconcileReport> {
        let mut total = ReconcileReport::default();
        for feed in feeds {
            total.merge(self.reconcile_feed(feed).await?);
        }
        Ok(total)
    }
}
