//! Sync orchestration
//!
//! Drives a full synchronization run: per configured feed, fetch and order
//! the remote items, classify each one against the local directory and the
//! tracking store, download what is missing or damaged, and record what was
//! fetched. Progress and lifecycle events go out over a broadcast channel;
//! the aggregated [`SyncReport`] is returned by value.

use crate::classify::{self, FileStatus, SizeOracle, classify, sidecar_path};
use crate::config::{Config, FeedConfig, SyncOptions};
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::feed::FeedReader;
use crate::filename;
use crate::reconcile::Reconciler;
use crate::store::{TrackedFile, TrackingStore};
use crate::types::{
    DownloadOutcome, FailedDownload, FeedItem, ReconcileReport, SyncEvent, SyncReport, SyncTask,
};
use chrono::Utc;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the event broadcast channel; slow subscribers lag rather
/// than blocking the run
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Coordinates feeds, downloads, and the tracking store for sync runs
pub struct SyncOrchestrator {
    config: Config,
    store: TrackingStore,
    reader: FeedReader,
    downloader: Downloader,
    oracle: SizeOracle,
    events: broadcast::Sender<SyncEvent>,
    stop: CancellationToken,
}

impl SyncOrchestrator {
    /// Build an orchestrator from a configuration snapshot.
    ///
    /// Opens (creating if necessary) the tracking store and constructs one
    /// shared HTTP client for feeds, size probes, and downloads.
    pub async fn new(config: Config) -> Result<Self> {
        let store = TrackingStore::open(&config.store_path).await?;

        // One client for everything; the configured timeout bounds
        // connection setup, while streaming reads run unbounded
        let client = reqwest::Client::builder()
            .connect_timeout(config.download.timeout)
            .build()?;

        let reader = FeedReader::new(client.clone(), config.download.timeout);
        let oracle = SizeOracle::new(client.clone(), config.download.timeout);
        let downloader = Downloader::new(client, config.download.clone(), config.retry.clone());

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            store,
            reader,
            downloader,
            oracle,
            events,
            stop: CancellationToken::new(),
        })
    }

    /// Subscribe to sync events. Each subscriber gets an independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Request a graceful stop. The run finishes its in-flight download,
    /// then returns the report for the work completed so far.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// The configuration snapshot this orchestrator was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying tracking store
    pub fn store(&self) -> &TrackingStore {
        &self.store
    }

    /// Run one synchronization pass over every configured feed.
    ///
    /// An unavailable feed aborts only its own pass; duplicate feed ids are
    /// skipped with a warning. A failure to create an output directory
    /// aborts the whole run, since every later decision depends on being
    /// able to write there.
    pub async fn run(&self, options: &SyncOptions) -> Result<SyncReport> {
        let mut total = SyncReport::default();
        let mut seen = HashSet::new();

        for feed in &self.config.feeds {
            if !seen.insert(feed.feed_id.as_str()) {
                warn!(feed_id = %feed.feed_id, "duplicate feed_id, skipping");
                continue;
            }

            tokio::fs::create_dir_all(&feed.output_dir)
                .await
                .map_err(|e| Error::Filesystem {
                    path: feed.output_dir.clone(),
                    reason: format!("failed to create output directory: {e}"),
                })?;

            let mut feed_report = SyncReport::default();
            match self.sync_feed(feed, options, &mut feed_report).await {
                Ok(()) => {
                    let _ = self.events.send(SyncEvent::FeedFinished {
                        feed_id: feed.feed_id.clone(),
                        report: feed_report.clone(),
                    });
                    total.merge(feed_report);
                }
                Err(Error::Stopped) => {
                    // Work already completed this feed still counts
                    info!(feed_id = %feed.feed_id, "stop requested, ending run");
                    total.merge(feed_report);
                    break;
                }
                Err(e @ Error::FeedUnavailable { .. }) => {
                    warn!(feed_id = %feed.feed_id, error = %e, "feed pass aborted");
                    let _ = self.events.send(SyncEvent::FeedFailed {
                        feed_id: feed.feed_id.clone(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            downloaded = total.downloaded,
            skipped = total.skipped,
            failed = total.failed,
            "sync run finished"
        );
        Ok(total)
    }

    /// Synchronize one feed: select items, then process each task in order.
    ///
    /// Accumulates into the caller-owned `report` so tasks finished before
    /// a stop signal stay counted.
    async fn sync_feed(
        &self,
        feed: &FeedConfig,
        options: &SyncOptions,
        report: &mut SyncReport,
    ) -> Result<()> {
        let items = self.reader.fetch(&feed.url).await?;
        let selected = select_items(items, options);

        let _ = self.events.send(SyncEvent::FeedStarted {
            feed_id: feed.feed_id.clone(),
            items: selected.len(),
        });

        for item in selected {
            if self.stop.is_cancelled() {
                return Err(Error::Stopped);
            }

            let task = self.plan_task(feed, item, options).await;
            self.process_task(&task, report).await?;
        }

        Ok(())
    }

    /// Resolve one item into its destination path and expected size.
    async fn plan_task(&self, feed: &FeedConfig, item: FeedItem, options: &SyncOptions) -> SyncTask {
        let stem = filename::resolve(&item.title, options.filename_mode);
        let file_name = format!("{}.{}", stem, self.config.download.media_extension);
        let target_path = feed.output_dir.join(&file_name);
        let expected_size = self.oracle.resolve(&item).await;

        SyncTask {
            feed_id: feed.feed_id.clone(),
            item,
            file_name,
            target_path,
            expected_size,
        }
    }

    /// Classify one task and perform whatever work its status demands.
    async fn process_task(&self, task: &SyncTask, report: &mut SyncReport) -> Result<()> {
        let tolerance = self.config.download.tolerance_bytes();
        let mut status = classify(&task.target_path, task.expected_size, tolerance);

        // A size-complete file with a stale sidecar is damage the size
        // check cannot see. An unreadable sidecar counts as stale.
        if status == FileStatus::Complete
            && self.config.download.generate_hash
            && sidecar_path(&task.target_path).exists()
            && !classify::sidecar_matches(&task.target_path).unwrap_or(false)
        {
            warn!(
                file_name = %task.file_name,
                "sidecar digest does not match file content"
            );
            status = FileStatus::Damaged;
        }

        match status {
            FileStatus::Complete => {
                report.skipped += 1;
                // Backfill: a complete file the store has never heard of
                // (predates tracking, or was restored by hand) gets a row
                if !self.store.contains(&task.feed_id, &task.file_name).await? {
                    self.adopt_existing(task).await?;
                }
                let _ = self.events.send(SyncEvent::TaskFinished {
                    feed_id: task.feed_id.clone(),
                    file_name: task.file_name.clone(),
                    outcome: DownloadOutcome::Skipped,
                });
                Ok(())
            }
            FileStatus::Damaged => {
                info!(
                    file_name = %task.file_name,
                    expected = ?task.expected_size,
                    "replacing damaged file"
                );
                if let Err(e) = self.remove_stale(task).await {
                    // Fatal to this task only; the run continues
                    warn!(
                        file_name = %task.file_name,
                        error = %e,
                        "could not remove damaged file"
                    );
                    report.failed += 1;
                    report.failures.push(FailedDownload {
                        title: task.item.title.clone(),
                        url: task.item.enclosure_url.clone(),
                        target_path: task.target_path.clone(),
                    });
                    let _ = self.events.send(SyncEvent::TaskFinished {
                        feed_id: task.feed_id.clone(),
                        file_name: task.file_name.clone(),
                        outcome: DownloadOutcome::Failed {
                            reason: e.to_string(),
                        },
                    });
                    return Ok(());
                }
                self.download_task(task, report).await
            }
            FileStatus::Missing => self.download_task(task, report).await,
        }
    }

    /// Delete a damaged file along with its sidecar, so a failed
    /// re-download cannot pair a fresh file with an old digest.
    async fn remove_stale(&self, task: &SyncTask) -> Result<()> {
        tokio::fs::remove_file(&task.target_path).await?;
        let sidecar = sidecar_path(&task.target_path);
        if sidecar.exists() {
            tokio::fs::remove_file(&sidecar).await?;
        }
        Ok(())
    }

    /// Record a complete on-disk file the store does not know about.
    async fn adopt_existing(&self, task: &SyncTask) -> Result<()> {
        let Some(size_bytes) = classify::file_size(&task.target_path) else {
            return Ok(());
        };
        let sha256 = std::fs::read_to_string(sidecar_path(&task.target_path))
            .ok()
            .map(|s| s.trim().to_string());

        debug!(feed_id = %task.feed_id, file_name = %task.file_name, "backfilling tracking row");
        self.store
            .upsert_file(&TrackedFile {
                feed_id: task.feed_id.clone(),
                file_name: task.file_name.clone(),
                title: task.item.title.clone(),
                size_bytes,
                sha256,
                downloaded_at: Utc::now(),
            })
            .await
    }

    /// Download one task, record it on success, tally it on failure.
    async fn download_task(&self, task: &SyncTask, report: &mut SyncReport) -> Result<()> {
        let _ = self.events.send(SyncEvent::TaskStarted {
            feed_id: task.feed_id.clone(),
            file_name: task.file_name.clone(),
        });

        let progress = |bytes_so_far: u64, total_bytes: Option<u64>, elapsed: std::time::Duration| {
            let _ = self.events.send(SyncEvent::Progress {
                feed_id: task.feed_id.clone(),
                file_name: task.file_name.clone(),
                bytes_so_far,
                total_bytes,
                elapsed,
            });
        };

        let outcome = match self
            .downloader
            .fetch(&task.item.enclosure_url, &task.target_path, Some(&progress))
            .await
        {
            Ok(downloaded) => {
                self.store
                    .upsert_file(&TrackedFile {
                        feed_id: task.feed_id.clone(),
                        file_name: task.file_name.clone(),
                        title: task.item.title.clone(),
                        size_bytes: downloaded.bytes_written,
                        sha256: downloaded.sha256,
                        downloaded_at: Utc::now(),
                    })
                    .await?;
                report.downloaded += 1;
                DownloadOutcome::Downloaded
            }
            Err(e) => {
                warn!(
                    file_name = %task.file_name,
                    url = %task.item.enclosure_url,
                    error = %e,
                    "download failed"
                );
                report.failed += 1;
                report.failures.push(FailedDownload {
                    title: task.item.title.clone(),
                    url: task.item.enclosure_url.clone(),
                    target_path: task.target_path.clone(),
                });
                DownloadOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let _ = self.events.send(SyncEvent::TaskFinished {
            feed_id: task.feed_id.clone(),
            file_name: task.file_name.clone(),
            outcome,
        });
        Ok(())
    }

    /// Square up the tracking store against every feed's directory.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport> {
        let reconciler = Reconciler::new(&self.store, self.config.download.clone());
        reconciler.reconcile_all(&self.config.feeds).await
    }
}

/// Apply the per-run selection pipeline: drop enclosure-less items, filter
/// by title substring, order by publication date, truncate to the count.
///
/// Items without a timestamp sort after timed ones in both directions,
/// keeping their relative feed order.
fn select_items(items: Vec<FeedItem>, options: &SyncOptions) -> Vec<FeedItem> {
    let needle = options.search.as_deref().map(str::to_lowercase);

    let mut selected: Vec<FeedItem> = items
        .into_iter()
        .filter(|item| !item.enclosure_url.is_empty())
        .filter(|item| match &needle {
            Some(n) => item.title.to_lowercase().contains(n),
            None => true,
        })
        .collect();

    selected.sort_by(|a, b| match (a.published_at, b.published_at) {
        (Some(x), Some(y)) => {
            if options.oldest_first {
                x.cmp(&y)
            } else {
                y.cmp(&x)
            }
        }
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    if let Some(count) = options.count {
        selected.truncate(count);
    }
    selected
}
