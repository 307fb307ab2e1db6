//! # torrss
//!
//! RSS-driven torrent admission for private trackers.
//!
//! Each configured task polls a tracker feed, runs new entries through an
//! ordered filter chain (size, title patterns, detail-page patterns, IMDb and
//! Douban ratings) and hands accepted ones to qBittorrent. Before submitting,
//! the pipeline checks free disk space and, if needed, evicts the completed
//! downloads that have seeded the longest.
//!
//! Every entry leaves a history record explaining what happened to it, and a
//! title is only ever processed once.
//!
//! ## Quick Start
//!
//! ```no_run
//! use torrss::{Config, TorRss, config::TaskConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.client.url = Some("http://127.0.0.1:8080".to_string());
//!     config.client.username = "admin".to_string();
//!     config.client.password = "adminadmin".to_string();
//!
//!     let mut task = TaskConfig::new("https://tracker.example.org/torrentrss.php?passkey=...");
//!     task.title_regex = Some("1080p|2160p".to_string());
//!     task.min_rating = Some(7.0);
//!     config.tasks.push(task);
//!
//!     let service = TorRss::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     service.start_scheduler();
//!     torrss::run_with_shutdown(service).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Download client abstraction and qBittorrent implementation
pub mod client;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Detail page fetching
pub mod detail;
/// Error types
pub mod error;
/// Feed fetching and parsing
pub mod feed;
/// Ordered filter chain
pub mod filter;
/// Admission pipeline orchestrator
pub mod pipeline;
/// Disk space admission and eviction planning
pub mod planner;
/// Rating extraction from detail pages
pub mod rating;
/// Periodic task runner
pub mod scheduler;
/// Top-level service handle
pub mod service;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use client::{DownloadClient, QBittorrentClient};
pub use config::{Config, TaskConfig};
pub use db::Database;
pub use error::{ClientError, DatabaseError, Error, Result};
pub use pipeline::AdmissionPipeline;
pub use planner::{AdmissionPlan, SpacePlanner};
pub use rating::{RatingExtractor, Ratings};
pub use scheduler::TaskScheduler;
pub use service::TorRss;
pub use types::{
    Disposition, DownloadCandidate, Event, FeedEntry, HistoryRecord, RejectReason,
    RemoteDownload, RunSummary, TaskId,
};

/// Run the service until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(service: TorRss) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
