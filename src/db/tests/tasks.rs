use super::{insert_test_task, setup_db};
use crate::config::TaskConfig;
use crate::types::TaskId;
use std::time::Duration;

#[tokio::test]
async fn test_insert_and_get_task_round_trips_rules() {
    let (db, _temp) = setup_db().await;

    let mut task = TaskConfig::new("https://pt.example.org/torrentrss.php?passkey=abc");
    task.cookie = Some("uid=1; pass=2".into());
    task.min_size_mb = 500;
    task.title_regex = Some("1080p".into());
    task.title_not_regex = Some("CAM".into());
    task.info_regex = Some("Blu-ray".into());
    task.info_not_regex = Some("Bootleg".into());
    task.min_rating = Some(7.5);
    task.category = Some("movies".into());
    task.interval = Duration::from_secs(600);

    let id = db.insert_task(&task).await.unwrap();
    let stored = db.get_task(id).await.unwrap().unwrap();

    assert_eq!(stored.id, id);
    assert_eq!(stored.site, "example");
    assert_eq!(stored.feed_url, task.feed_url);
    assert_eq!(stored.cookie.as_deref(), Some("uid=1; pass=2"));
    assert_eq!(stored.min_size_mb, 500);
    assert_eq!(stored.title_regex.as_deref(), Some("1080p"));
    assert_eq!(stored.title_not_regex.as_deref(), Some("CAM"));
    assert_eq!(stored.info_regex.as_deref(), Some("Blu-ray"));
    assert_eq!(stored.info_not_regex.as_deref(), Some("Bootleg"));
    assert_eq!(stored.min_rating, Some(7.5));
    assert_eq!(stored.category.as_deref(), Some("movies"));
    assert_eq!(stored.interval, Duration::from_secs(600));
    assert!(stored.active);
    assert_eq!(stored.accept_count, 0);
}

#[tokio::test]
async fn test_get_missing_task_returns_none() {
    let (db, _temp) = setup_db().await;
    assert!(db.get_task(TaskId(999)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_all_tasks_and_find_by_url() {
    let (db, _temp) = setup_db().await;
    let first = insert_test_task(&db, "https://a.example.org/rss").await;
    let second = insert_test_task(&db, "https://b.example.org/rss").await;

    let all = db.get_all_tasks().await.unwrap();
    assert_eq!(
        all.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![first, second]
    );

    let found = db
        .find_task_by_url("https://b.example.org/rss")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, second);
    assert!(
        db.find_task_by_url("https://c.example.org/rss")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_update_task_keeps_counters() {
    let (db, _temp) = setup_db().await;
    let id = insert_test_task(&db, "https://pt.example.org/rss").await;
    db.add_task_counts(id, 2, 10).await.unwrap();

    let mut task = db.get_task(id).await.unwrap().unwrap();
    task.title_regex = Some("2160p".into());
    assert!(db.update_task(&task).await.unwrap());

    let stored = db.get_task(id).await.unwrap().unwrap();
    assert_eq!(stored.title_regex.as_deref(), Some("2160p"));
    assert_eq!(stored.accept_count, 2);

    task.id = TaskId(12345);
    assert!(!db.update_task(&task).await.unwrap());
}

#[tokio::test]
async fn test_delete_task() {
    let (db, _temp) = setup_db().await;
    let id = insert_test_task(&db, "https://pt.example.org/rss").await;

    assert!(db.delete_task(id).await.unwrap());
    assert!(db.get_task(id).await.unwrap().is_none());
    assert!(!db.delete_task(id).await.unwrap());
}

#[tokio::test]
async fn test_set_task_active_toggles_flag() {
    let (db, _temp) = setup_db().await;
    let id = insert_test_task(&db, "https://pt.example.org/rss").await;

    assert!(db.set_task_active(id, false).await.unwrap());
    assert!(!db.get_task(id).await.unwrap().unwrap().active);

    assert!(db.set_task_active(id, true).await.unwrap());
    assert!(db.get_task(id).await.unwrap().unwrap().active);

    assert!(!db.set_task_active(TaskId(404), true).await.unwrap());
}

#[tokio::test]
async fn test_add_task_counts_accumulates() {
    let (db, _temp) = setup_db().await;
    let id = insert_test_task(&db, "https://pt.example.org/rss").await;

    db.add_task_counts(id, 1, 5).await.unwrap();
    db.add_task_counts(id, 3, 7).await.unwrap();

    assert_eq!(db.get_task(id).await.unwrap().unwrap().accept_count, 4);
    let total: i64 = sqlx::query_scalar("SELECT total_count FROM rss_tasks WHERE id = ?")
        .bind(id)
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(total, 12);
}

#[tokio::test]
async fn test_touch_last_run() {
    let (db, _temp) = setup_db().await;
    let id = insert_test_task(&db, "https://pt.example.org/rss").await;

    assert!(db.get_task_last_run(id).await.unwrap().is_none());
    let before = chrono::Utc::now().timestamp();
    db.touch_task_last_run(id).await.unwrap();
    let last_run = db.get_task_last_run(id).await.unwrap().unwrap();
    assert!(last_run >= before);
}
