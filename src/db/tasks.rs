//! RSS task CRUD operations.

use crate::config::TaskConfig;
use crate::error::DatabaseError;
use crate::types::TaskId;
use crate::{Error, Result};

use super::{Database, TaskRow};

const TASK_COLUMNS: &str = r#"
    id, site, feed_url, cookie, min_size_mb, title_regex, title_not_regex,
    info_regex, info_not_regex, min_rating, category, interval_secs, active,
    accept_count, total_count, last_run, created_at
"#;

impl Database {
    /// Insert a new task, returning its ID
    ///
    /// The `id` field of `task` is ignored.
    pub async fn insert_task(&self, task: &TaskConfig) -> Result<TaskId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO rss_tasks (site, feed_url, cookie, min_size_mb, title_regex,
                                   title_not_regex, info_regex, info_not_regex, min_rating,
                                   category, interval_secs, active, accept_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.site)
        .bind(&task.feed_url)
        .bind(&task.cookie)
        .bind(task.min_size_mb as i64)
        .bind(&task.title_regex)
        .bind(&task.title_not_regex)
        .bind(&task.info_regex)
        .bind(&task.info_not_regex)
        .bind(task.min_rating)
        .bind(&task.category)
        .bind(task.interval.as_secs() as i64)
        .bind(task.active as i32)
        .bind(task.accept_count as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert task: {}",
                e
            )))
        })?;

        Ok(TaskId(result.last_insert_rowid()))
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: TaskId) -> Result<Option<TaskConfig>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM rss_tasks WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        Ok(row.map(TaskConfig::from))
    }

    /// Get all tasks, oldest first
    pub async fn get_all_tasks(&self) -> Result<Vec<TaskConfig>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM rss_tasks ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get tasks: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(TaskConfig::from).collect())
    }

    /// Find a task by its feed URL
    pub async fn find_task_by_url(&self, feed_url: &str) -> Result<Option<TaskConfig>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM rss_tasks WHERE feed_url = ? ORDER BY id ASC LIMIT 1"
        ))
        .bind(feed_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find task by URL: {}",
                e
            )))
        })?;

        Ok(row.map(TaskConfig::from))
    }

    /// Replace a task's rules
    ///
    /// Counters and `last_run` are left untouched. Returns false if no task
    /// has `task.id`.
    pub async fn update_task(&self, task: &TaskConfig) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rss_tasks
            SET site = ?, feed_url = ?, cookie = ?, min_size_mb = ?, title_regex = ?,
                title_not_regex = ?, info_regex = ?, info_not_regex = ?, min_rating = ?,
                category = ?, interval_secs = ?, active = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.site)
        .bind(&task.feed_url)
        .bind(&task.cookie)
        .bind(task.min_size_mb as i64)
        .bind(&task.title_regex)
        .bind(&task.title_not_regex)
        .bind(&task.info_regex)
        .bind(&task.info_not_regex)
        .bind(task.min_rating)
        .bind(&task.category)
        .bind(task.interval.as_secs() as i64)
        .bind(task.active as i32)
        .bind(task.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update task: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a task
    ///
    /// History records are kept: they still deduplicate titles for other tasks.
    pub async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rss_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete task: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Pause or resume a task
    pub async fn set_task_active(&self, id: TaskId, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE rss_tasks SET active = ? WHERE id = ?")
            .bind(active as i32)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set task active flag: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Add a run's counts to the task's cumulative counters
    pub async fn add_task_counts(&self, id: TaskId, accepted: u64, seen: u64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rss_tasks
            SET accept_count = accept_count + ?, total_count = total_count + ?
            WHERE id = ?
            "#,
        )
        .bind(accepted as i64)
        .bind(seen as i64)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update task counters: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record that a run of the task just finished
    pub async fn touch_task_last_run(&self, id: TaskId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE rss_tasks SET last_run = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update task last run: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Unix timestamp of the task's last finished run
    pub async fn get_task_last_run(&self, id: TaskId) -> Result<Option<i64>> {
        let last_run: Option<Option<i64>> =
            sqlx::query_scalar("SELECT last_run FROM rss_tasks WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get task last run: {}",
                        e
                    )))
                })?;

        Ok(last_run.flatten())
    }
}
