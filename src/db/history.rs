//! History record operations.
//!
//! Every stage of the filter chain commits its outcome here before the next
//! stage runs, so a crash mid-entry leaves the record in its last known state.

use crate::types::{Disposition, HistoryRecord, TaskId};
use crate::{Error, Result};

use super::{Database, HistoryRow, NewHistoryRecord};

const HISTORY_COLUMNS: &str = r#"
    id, task_id, site, title, info_link, download_link, size, disposition,
    reason, imdb_id, added_at
"#;

impl Database {
    /// Whether any task has already recorded an entry with this title
    pub async fn history_title_exists(&self, title: &str) -> Result<bool> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM rss_history WHERE title = ?)")
                .bind(title)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?;

        Ok(exists != 0)
    }

    /// Insert a pending history record
    ///
    /// Returns `None` if a record with the same title already exists, which
    /// happens when two tasks race on an entry that appears in both feeds.
    pub async fn insert_history_record(
        &self,
        record: &NewHistoryRecord<'_>,
    ) -> Result<Option<i64>> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO rss_history (task_id, site, title, info_link, download_link, size,
                                     disposition, added_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(title) DO NOTHING
            "#,
        )
        .bind(record.task_id)
        .bind(record.site)
        .bind(record.title)
        .bind(record.info_link)
        .bind(record.download_link)
        .bind(record.size as i64)
        .bind(Disposition::Pending.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(result.last_insert_rowid()))
    }

    /// Mark a record rejected with the given reason
    pub async fn set_history_reason(&self, id: i64, reason: &str) -> Result<()> {
        sqlx::query("UPDATE rss_history SET reason = ?, disposition = ? WHERE id = ?")
            .bind(reason)
            .bind(Disposition::Rejected.to_i32())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Store the rating identifier found on the detail page
    pub async fn set_history_imdb_id(&self, id: i64, imdb_id: &str) -> Result<()> {
        sqlx::query("UPDATE rss_history SET imdb_id = ? WHERE id = ?")
            .bind(imdb_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Update a record's disposition
    pub async fn set_history_disposition(&self, id: i64, disposition: Disposition) -> Result<()> {
        sqlx::query("UPDATE rss_history SET disposition = ? WHERE id = ?")
            .bind(disposition.to_i32())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Get a single history record by ID
    pub async fn get_history_record(&self, id: i64) -> Result<Option<HistoryRecord>> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM rss_history WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.map(HistoryRecord::from))
    }

    /// Get the history record for a title, if any
    pub async fn get_history_by_title(&self, title: &str) -> Result<Option<HistoryRecord>> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM rss_history WHERE title = ?"
        ))
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.map(HistoryRecord::from))
    }

    /// Query history with pagination and optional task filter
    ///
    /// Returns records newest first.
    pub async fn query_history(
        &self,
        task_filter: Option<TaskId>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryRecord>> {
        let rows = if let Some(task_id) = task_filter {
            sqlx::query_as::<_, HistoryRow>(&format!(
                r#"
                SELECT {HISTORY_COLUMNS}
                FROM rss_history
                WHERE task_id = ?
                ORDER BY added_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#
            ))
            .bind(task_id)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, HistoryRow>(&format!(
                r#"
                SELECT {HISTORY_COLUMNS}
                FROM rss_history
                ORDER BY added_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#
            ))
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryRecord::from).collect())
    }

    /// Count history records, optionally for one task
    pub async fn count_history(&self, task_filter: Option<TaskId>) -> Result<i64> {
        let count: i64 = if let Some(task_id) = task_filter {
            sqlx::query_scalar("SELECT COUNT(*) FROM rss_history WHERE task_id = ?")
                .bind(task_id)
                .fetch_one(&self.pool)
                .await
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM rss_history")
                .fetch_one(&self.pool)
                .await
        }
        .map_err(Error::Sqlx)?;

        Ok(count)
    }
}
