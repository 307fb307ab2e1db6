use crate::config::TaskConfig;
use crate::db::*;
use tempfile::NamedTempFile;

mod tasks;

/// Helper: create a fresh database with migrations applied
async fn setup_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

/// Helper: insert a task for `feed_url` with default rules
async fn insert_test_task(db: &Database, feed_url: &str) -> crate::types::TaskId {
    db.insert_task(&TaskConfig::new(feed_url)).await.unwrap()
}
