//! Database layer for torrss
//!
//! Handles SQLite persistence for RSS tasks and the entry history.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: database lifecycle, schema migrations
//! - [`tasks`]: RSS task CRUD, pause flag, counters
//! - [`history`]: history records (dedup lookups, per-stage commits, queries)

use crate::config::TaskConfig;
use crate::types::{Disposition, HistoryRecord, TaskId};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::time::Duration;

mod history;
mod migrations;
mod tasks;

/// RSS task record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    /// Unique database ID
    pub id: i64,
    /// Site label
    pub site: String,
    /// Feed URL
    pub feed_url: String,
    /// Stored cookie string
    pub cookie: Option<String>,
    /// Minimum size in MiB
    pub min_size_mb: i64,
    /// Title include regex
    pub title_regex: Option<String>,
    /// Title exclude regex
    pub title_not_regex: Option<String>,
    /// Detail page include regex
    pub info_regex: Option<String>,
    /// Detail page exclude regex
    pub info_not_regex: Option<String>,
    /// Rating threshold
    pub min_rating: Option<f64>,
    /// Client category
    pub category: Option<String>,
    /// Interval between runs in seconds
    pub interval_secs: i64,
    /// Whether the task is scheduled (0 = paused, 1 = active)
    pub active: i32,
    /// Cumulative accepted entries
    pub accept_count: i64,
    /// Cumulative entries seen in feeds
    pub total_count: i64,
    /// Unix timestamp of the last finished run
    pub last_run: Option<i64>,
    /// Unix timestamp when task was created
    pub created_at: i64,
}

impl From<TaskRow> for TaskConfig {
    fn from(row: TaskRow) -> Self {
        TaskConfig {
            id: TaskId(row.id),
            site: row.site,
            feed_url: row.feed_url,
            cookie: row.cookie,
            min_size_mb: row.min_size_mb.max(0) as u64,
            title_regex: row.title_regex,
            title_not_regex: row.title_not_regex,
            info_regex: row.info_regex,
            info_not_regex: row.info_not_regex,
            min_rating: row.min_rating,
            category: row.category,
            interval: Duration::from_secs(row.interval_secs.max(1) as u64),
            active: row.active != 0,
            accept_count: row.accept_count.max(0) as u64,
        }
    }
}

/// History record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// Unique database ID
    pub id: i64,
    /// Owning task
    pub task_id: i64,
    /// Site label
    pub site: String,
    /// Entry title
    pub title: String,
    /// Detail page URL
    pub info_link: String,
    /// Download URL
    pub download_link: String,
    /// Declared size in bytes
    pub size: i64,
    /// Disposition code (see [`Disposition`])
    pub disposition: i32,
    /// Rejection reason
    pub reason: Option<String>,
    /// Rating identifier
    pub imdb_id: Option<String>,
    /// Unix timestamp when the record was created
    pub added_at: i64,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(row: HistoryRow) -> Self {
        use chrono::{TimeZone, Utc};

        HistoryRecord {
            id: row.id,
            task_id: TaskId(row.task_id),
            site: row.site,
            title: row.title,
            info_link: row.info_link,
            download_link: row.download_link,
            size: row.size.max(0) as u64,
            disposition: Disposition::from_i32(row.disposition),
            reason: row.reason,
            imdb_id: row.imdb_id,
            added_at: Utc
                .timestamp_opt(row.added_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

/// New history record, created when an entry first passes deduplication
#[derive(Debug, Clone)]
pub struct NewHistoryRecord<'a> {
    /// Owning task
    pub task_id: TaskId,
    /// Site label
    pub site: &'a str,
    /// Entry title
    pub title: &'a str,
    /// Detail page URL
    pub info_link: &'a str,
    /// Download URL
    pub download_link: &'a str,
    /// Declared size in bytes
    pub size: u64,
}

/// Database handle for torrss
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
