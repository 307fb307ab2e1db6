//! Disk space admission and eviction planning.
//!
//! [`SpacePlanner::plan`] is pure: it decides from a free-space figure and a
//! snapshot of the client's downloads whether a candidate fits, and which
//! completed downloads must go to make it fit. [`evict`] carries a plan out.
//!
//! Bytes still owed to incomplete downloads (`reserved`) are treated as
//! already spent. Completed downloads are evicted longest-seeded first, and
//! only the shortest prefix of that order that restores the safety margin is
//! removed.

use crate::client::DownloadClient;
use crate::types::RemoteDownload;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of a planning decision
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdmissionPlan {
    /// Whether the candidate may be submitted
    pub admit: bool,
    /// Completed downloads to delete first, in deletion order
    pub to_evict: Vec<RemoteDownload>,
}

impl AdmissionPlan {
    /// Bytes the eviction set gives back
    pub fn reclaimed(&self) -> u64 {
        self.to_evict.iter().map(|d| d.downloaded).sum()
    }
}

/// Greedy eviction planner
#[derive(Clone, Copy, Debug)]
pub struct SpacePlanner {
    safety_margin: u64,
}

impl SpacePlanner {
    /// Create a planner that keeps `safety_margin` bytes free after every admission
    pub fn new(safety_margin: u64) -> Self {
        Self { safety_margin }
    }

    /// Bytes still to be downloaded by incomplete downloads
    pub fn reserved(downloads: &[RemoteDownload]) -> u64 {
        downloads
            .iter()
            .filter(|d| !d.is_complete())
            .map(|d| d.amount_left)
            .sum()
    }

    /// Decide whether `candidate_size` bytes fit into `free_space`
    ///
    /// `free_space` is signed: a run-local budget may already have been driven
    /// below zero by earlier admissions.
    pub fn plan(
        &self,
        candidate_size: u64,
        free_space: i64,
        downloads: &[RemoteDownload],
    ) -> AdmissionPlan {
        let margin = i128::from(self.safety_margin);
        let base = i128::from(free_space)
            - i128::from(Self::reserved(downloads))
            - i128::from(candidate_size);

        if base > margin {
            return AdmissionPlan {
                admit: true,
                to_evict: Vec::new(),
            };
        }

        let mut completed: Vec<&RemoteDownload> =
            downloads.iter().filter(|d| d.is_complete()).collect();
        // Stable sort keeps client order among equal seeding times
        completed.sort_by(|a, b| b.seeding_time.cmp(&a.seeding_time));

        let mut reclaimed: i128 = 0;
        for (i, download) in completed.iter().enumerate() {
            reclaimed += i128::from(download.downloaded);
            if base + reclaimed > margin {
                return AdmissionPlan {
                    admit: true,
                    to_evict: completed[..=i].iter().map(|d| (*d).clone()).collect(),
                };
            }
        }

        AdmissionPlan::default()
    }
}

/// Delete every download in `to_evict`, pausing after each deletion
///
/// Deletion is best-effort: failures are logged and the rest still run.
/// Returns the downloads that were actually removed.
pub async fn evict(
    client: &dyn DownloadClient,
    to_evict: &[RemoteDownload],
    pause: Duration,
) -> Vec<RemoteDownload> {
    let mut removed = Vec::with_capacity(to_evict.len());
    for download in to_evict {
        match client.delete_download(&download.hash, true).await {
            Ok(()) => {
                info!(
                    hash = %download.hash,
                    name = %download.name,
                    seeding_secs = download.seeding_time.as_secs(),
                    reclaimed = %crate::utils::human_size(download.downloaded as i64),
                    "evicted completed download"
                );
                removed.push(download.clone());
            }
            Err(e) => {
                warn!(hash = %download.hash, name = %download.name, error = %e, "failed to evict download");
            }
        }
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    removed
}
