//! Admission pipeline: one task run from feed to download client.
//!
//! A run snapshots the client's free space once, then walks the feed in order.
//! Each item goes through the [`FilterChain`]; accepted entries are planned
//! against the run-local budget, evictions are carried out, and the candidate
//! is submitted. Every per-entry failure ends up as a rejection reason on the
//! entry's history record; only run-level failures are returned as `Err`.
//!
//! All runs share one admission gate. Holding it covers listing the client's
//! downloads, planning, evicting and submitting, so two concurrent runs never
//! reason about the same free space at the same time. The gate also keeps a
//! ledger of bytes admitted process-wide: a run subtracts whatever other runs
//! admitted after its own snapshot before planning.

use crate::client::DownloadClient;
use crate::config::{AdmissionConfig, TaskConfig};
use crate::db::Database;
use crate::detail::DetailSource;
use crate::error::Result;
use crate::feed::{FeedItem, FeedReader};
use crate::filter::{Decision, FilterChain};
use crate::planner::{SpacePlanner, evict};
use crate::types::{
    DownloadCandidate, Disposition, Event, FeedEntry, RejectReason, RunSummary, TaskId,
};
use crate::utils::{human_size, is_valid_download_link, site_id};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bytes admitted through the gate since process start
#[derive(Debug, Default)]
struct AdmissionLedger {
    admitted: u64,
}

/// Run-local view of free space
#[derive(Debug)]
struct StorageBudget {
    /// Free bytes as seen by this run; `None` if the snapshot failed
    free: Option<i64>,
    /// Ledger value when the snapshot was taken
    ledger_base: u64,
    /// Bytes this run has admitted since
    own_admitted: u64,
}

impl StorageBudget {
    /// Budget after discounting other runs' admissions
    fn effective(&self, ledger: &AdmissionLedger) -> Option<i64> {
        let others = ledger
            .admitted
            .saturating_sub(self.ledger_base)
            .saturating_sub(self.own_admitted);
        self.free.map(|free| free.saturating_sub(others as i64))
    }
}

/// Orchestrates task runs
///
/// Share one instance (behind an `Arc`) between every concurrent run so that
/// they share the admission gate.
pub struct AdmissionPipeline {
    db: Arc<Database>,
    client: Arc<dyn DownloadClient>,
    details: Arc<dyn DetailSource>,
    feeds: FeedReader,
    planner: SpacePlanner,
    eviction_pause: Duration,
    dry_run: bool,
    gate: Mutex<AdmissionLedger>,
    event_tx: broadcast::Sender<Event>,
}

impl AdmissionPipeline {
    /// Create a pipeline
    pub fn new(
        config: &AdmissionConfig,
        db: Arc<Database>,
        client: Arc<dyn DownloadClient>,
        details: Arc<dyn DetailSource>,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        Ok(Self {
            db,
            client,
            details,
            feeds: FeedReader::new(config.fetch_timeout, &config.user_agent)?,
            planner: SpacePlanner::new(config.safety_margin),
            eviction_pause: config.eviction_pause,
            dry_run: config.dry_run,
            gate: Mutex::new(AdmissionLedger::default()),
            event_tx,
        })
    }

    /// Fetch the task's feed and run every item through admission
    ///
    /// Fails before touching any entry if a task pattern is invalid or the
    /// feed cannot be fetched or parsed.
    pub async fn run(&self, task: &TaskConfig, cancel: &CancellationToken) -> Result<RunSummary> {
        let result = self.fetch_and_process(task, cancel).await;

        if let Err(e) = &result {
            error!(task_id = %task.id, feed = %task.feed_url, error = %e, "task run failed");
            self.emit(Event::RunFailed {
                task_id: task.id,
                error: e.to_string(),
            });
        }
        result
    }

    async fn fetch_and_process(
        &self,
        task: &TaskConfig,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let chain = self.compile(task)?;
        let items = self.feeds.fetch(&task.feed_url).await?;
        self.process(&chain, items, cancel).await
    }

    /// Run already-parsed feed items through admission
    pub async fn run_items(
        &self,
        task: &TaskConfig,
        items: Vec<FeedItem>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let chain = self.compile(task)?;
        self.process(&chain, items, cancel).await
    }

    fn compile(&self, task: &TaskConfig) -> Result<FilterChain> {
        FilterChain::new(task.clone(), self.db.clone(), self.details.clone())
    }

    async fn process(
        &self,
        chain: &FilterChain,
        items: Vec<FeedItem>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        let task = chain.task();
        let mut budget = self.snapshot_budget().await;
        let mut summary = RunSummary::default();

        for item in items {
            if cancel.is_cancelled() {
                info!(task_id = %task.id, "run cancelled, remaining entries left for the next run");
                break;
            }
            summary.total += 1;

            match chain.evaluate(item).await? {
                Decision::Malformed => {
                    summary.malformed += 1;
                    warn!(task_id = %task.id, "skipping malformed feed entry");
                }
                Decision::Duplicate { title } => {
                    summary.skipped += 1;
                    debug!(task_id = %task.id, %title, "already in history");
                }
                Decision::Reject { title, reason, .. } => {
                    summary.rejected += 1;
                    self.emit_rejected(task.id, title, &reason);
                }
                Decision::Accept {
                    record_id,
                    entry,
                    imdb_id,
                } => {
                    let candidate = build_candidate(task, &entry, imdb_id);
                    match self.admit(task.id, &candidate, &mut budget).await {
                        Ok(()) => {
                            self.db
                                .set_history_disposition(record_id, Disposition::Downloaded)
                                .await?;
                            summary.downloaded += 1;
                            info!(
                                task_id = %task.id,
                                title = %candidate.title,
                                size = %human_size(candidate.size as i64),
                                save_path = ?candidate.save_path,
                                "entry submitted to download client"
                            );
                            self.emit(Event::EntryDownloaded {
                                task_id: task.id,
                                title: candidate.title,
                                size: candidate.size,
                            });
                        }
                        Err(reason) => {
                            self.db
                                .set_history_reason(record_id, &reason.to_string())
                                .await?;
                            summary.rejected += 1;
                            self.emit_rejected(task.id, entry.title, &reason);
                        }
                    }
                }
            }
        }

        self.db
            .add_task_counts(task.id, summary.downloaded as u64, summary.total as u64)
            .await?;
        self.db.touch_task_last_run(task.id).await?;

        info!(
            task_id = %task.id,
            site = %task.site,
            total = summary.total,
            skipped = summary.skipped,
            malformed = summary.malformed,
            rejected = summary.rejected,
            downloaded = summary.downloaded,
            "task run complete"
        );
        self.emit(Event::RunCompleted {
            task_id: task.id,
            summary: summary.clone(),
        });
        Ok(summary)
    }

    async fn snapshot_budget(&self) -> StorageBudget {
        let ledger = self.gate.lock().await;
        let free = match self.client.free_space().await {
            Ok(free) => {
                debug!(free_space = %human_size(free as i64), "storage budget snapshot");
                Some(free.min(i64::MAX as u64) as i64)
            }
            Err(e) => {
                warn!(error = %e, "free space query failed, nothing will be submitted this run");
                None
            }
        };
        StorageBudget {
            free,
            ledger_base: ledger.admitted,
            own_admitted: 0,
        }
    }

    /// Plan, evict and submit one candidate under the admission gate
    async fn admit(
        &self,
        task_id: TaskId,
        candidate: &DownloadCandidate,
        budget: &mut StorageBudget,
    ) -> std::result::Result<(), RejectReason> {
        if !is_valid_download_link(&candidate.url) {
            warn!(%task_id, title = %candidate.title, url = %candidate.url, "download link has no passkey or hash");
            return Err(RejectReason::Client);
        }

        if self.dry_run {
            info!(
                %task_id,
                title = %candidate.title,
                url = %candidate.url,
                save_path = ?candidate.save_path,
                category = ?candidate.category,
                tag = ?candidate.tag,
                "dry run: not submitting"
            );
            return Ok(());
        }

        let mut ledger = self.gate.lock().await;

        let Some(free) = budget.effective(&ledger) else {
            return Err(RejectReason::Client);
        };

        let downloads = self.client.list_downloads().await.map_err(|e| {
            warn!(%task_id, error = %e, "failed to list client downloads");
            RejectReason::Client
        })?;

        let plan = self.planner.plan(candidate.size, free, &downloads);
        if !plan.admit {
            warn!(
                %task_id,
                title = %candidate.title,
                size = %human_size(candidate.size as i64),
                budget = %human_size(free),
                "insufficient space even after eviction"
            );
            return Err(RejectReason::Client);
        }

        if !plan.to_evict.is_empty() {
            info!(
                %task_id,
                title = %candidate.title,
                count = plan.to_evict.len(),
                reclaim = %human_size(plan.reclaimed() as i64),
                "evicting completed downloads to make room"
            );
            let removed = evict(self.client.as_ref(), &plan.to_evict, self.eviction_pause).await;
            for download in removed {
                if let Some(free) = budget.free.as_mut() {
                    *free = free.saturating_add(download.downloaded as i64);
                }
                self.emit(Event::DownloadEvicted {
                    hash: download.hash,
                    name: download.name,
                    reclaimed: download.downloaded,
                });
            }
        }

        self.client.add_download(candidate).await.map_err(|e| {
            warn!(%task_id, title = %candidate.title, error = %e, "download client rejected submission");
            RejectReason::Client
        })?;

        if let Some(free) = budget.free.as_mut() {
            *free = free.saturating_sub(candidate.size as i64);
        }
        budget.own_admitted += candidate.size;
        ledger.admitted += candidate.size;
        Ok(())
    }

    fn emit_rejected(&self, task_id: TaskId, title: String, reason: &RejectReason) {
        self.emit(Event::EntryRejected {
            task_id,
            title,
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Build the client submission for an accepted entry
fn build_candidate(task: &TaskConfig, entry: &FeedEntry, imdb_id: Option<String>) -> DownloadCandidate {
    DownloadCandidate {
        title: entry.title.clone(),
        size: entry.size,
        url: entry.download_link.clone(),
        save_path: Some(site_id(&entry.detail_link, imdb_id.as_deref())),
        category: task.category.clone(),
        tag: imdb_id,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
