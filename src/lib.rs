//! # podsync
//!
//! Podcast feed synchronization engine: keeps local episode directories in
//! step with their RSS/Atom feeds.
//!
//! ## Design Philosophy
//!
//! podsync is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Idempotent** - A second run over an unchanged feed performs no I/O
//! - **Event-driven** - Consumers subscribe to progress events, no polling
//! - **Self-healing** - Damaged files are detected by size (and optionally
//!   by hash sidecar) and replaced
//!
//! ## Quick Start
//!
//! ```no_run
//! use podsync::{Config, FeedConfig, SyncOptions, SyncOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         feeds: vec![FeedConfig {
//!             feed_id: "morning-news".to_string(),
//!             url: "https://example.com/feed.xml".to_string(),
//!             output_dir: "/media/podcasts/morning-news".into(),
//!         }],
//!         ..Default::default()
//!     };
//!
//!     let orchestrator = SyncOrchestrator::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = orchestrator.run(&SyncOptions::default()).await?;
//!     println!("downloaded {}, skipped {}", report.downloaded, report.skipped);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Local file completeness classification
pub mod classify;
/// Configuration types
pub mod config;
/// Streaming enclosure downloads
pub mod download;
/// Error types
pub mod error;
/// Feed fetching and parsing
pub mod feed;
/// Episode filename resolution
pub mod filename;
/// Store/disk square-up
pub mod reconcile;
/// Retry logic with exponential backoff
pub mod retry;
/// Tracking store persistence layer
pub mod store;
/// Sync orchestration
pub mod sync;
/// Core types and events
pub mod types;
/// Formatting helpers
pub mod utils;

// Re-export commonly used types
pub use classify::{FileStatus, SizeOracle};
pub use config::{
    Config, DownloadConfig, FeedConfig, FilenameMode, RetryConfig, SyncOptions,
};
pub use download::{DownloadedFile, Downloader};
pub use error::{Error, Result, StoreError};
pub use feed::FeedReader;
pub use reconcile::Reconciler;
pub use store::{TrackedFile, TrackingStore};
pub use sync::SyncOrchestrator;
pub use types::{
    DownloadOutcome, FailedDownload, FeedItem, ReconcileReport, SyncEvent, SyncReport, SyncTask,
};
