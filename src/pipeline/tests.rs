use super::*;
use crate::client::UnconfiguredClient;
use crate::test_helpers::{FakeClient, StaticDetails, feed_item, remote, setup_db};
use tempfile::NamedTempFile;

struct Harness {
    pipeline: Arc<AdmissionPipeline>,
    db: Arc<Database>,
    events: broadcast::Receiver<Event>,
    _temp: NamedTempFile,
}

fn admission(margin: u64) -> AdmissionConfig {
    AdmissionConfig {
        safety_margin: margin,
        eviction_pause: Duration::ZERO,
        ..AdmissionConfig::default()
    }
}

async fn harness(
    config: AdmissionConfig,
    client: Arc<dyn DownloadClient>,
    details: StaticDetails,
) -> Harness {
    let (db, temp) = setup_db().await;
    let (event_tx, events) = broadcast::channel(100);
    let pipeline =
        AdmissionPipeline::new(&config, db.clone(), client, Arc::new(details), event_tx).unwrap();
    Harness {
        pipeline: Arc::new(pipeline),
        db,
        events,
        _temp: temp,
    }
}

async fn insert_task(db: &Database, feed_url: &str) -> TaskConfig {
    let mut task = TaskConfig::new(feed_url);
    task.min_size_mb = 0;
    task.category = Some("movies".into());
    task.id = db.insert_task(&task).await.unwrap();
    task
}

async fn disposition_of(db: &Database, title: &str) -> (Disposition, Option<String>) {
    let record = db.get_history_by_title(title).await.unwrap().unwrap();
    (record.disposition, record.reason)
}

#[tokio::test]
async fn rerunning_unchanged_feed_creates_no_new_records() {
    let client = FakeClient::new(10_000, vec![]);
    let h = harness(admission(100), Arc::new(client.clone()), StaticDetails::default()).await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;
    let items = vec![feed_item(1, "A", 10), feed_item(2, "B", 10)];
    let cancel = CancellationToken::new();

    let first = h
        .pipeline
        .run_items(&task, items.clone(), &cancel)
        .await
        .unwrap();
    assert_eq!(first.downloaded, 2);

    let second = h.pipeline.run_items(&task, items, &cancel).await.unwrap();
    assert_eq!(second.skipped, 2);
    assert_eq!(second.downloaded, 0);
    assert_eq!(h.db.count_history(None).await.unwrap(), 2);
    assert_eq!(client.added().len(), 2);
}

#[tokio::test]
async fn accepted_entry_is_submitted_with_site_id_and_category() {
    let client = FakeClient::new(10_000, vec![]);
    let details = StaticDetails::default().with_page(
        "https://pt.example.org/details.php?id=42",
        "https://www.imdb.com/title/tt0111161/",
    );
    let h = harness(admission(100), Arc::new(client.clone()), details).await;
    let mut task = insert_task(&h.db, "https://pt.example.org/rss").await;
    task.cookie = Some("uid=1".into());

    let summary = h
        .pipeline
        .run_items(
            &task,
            vec![feed_item(42, "Good.Movie", 500)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(summary.downloaded, 1);

    let added = client.added();
    assert_eq!(added.len(), 1);
    assert_eq!(
        added[0].url,
        "https://pt.example.org/download.php?id=42&passkey=abc"
    );
    assert_eq!(added[0].save_path.as_deref(), Some("example_42_tt0111161"));
    assert_eq!(added[0].category.as_deref(), Some("movies"));
    assert_eq!(added[0].tag.as_deref(), Some("tt0111161"));

    let (disposition, reason) = disposition_of(&h.db, "Good.Movie").await;
    assert_eq!(disposition, Disposition::Downloaded);
    assert!(reason.is_none());
}

#[tokio::test]
async fn eviction_makes_room_for_candidate() {
    let client = FakeClient::new(1_000, vec![remote("old", 1.0, 500, 1_000)]);
    let h = harness(admission(100), Arc::new(client.clone()), StaticDetails::default()).await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;

    let summary = h
        .pipeline
        .run_items(
            &task,
            vec![feed_item(1, "Big", 950)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(client.deleted(), vec!["old".to_string()]);
    assert_eq!(client.added().len(), 1);
}

#[tokio::test]
async fn budget_is_decremented_within_a_run() {
    let client = FakeClient::new(1_000, vec![]);
    let h = harness(admission(100), Arc::new(client.clone()), StaticDetails::default()).await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;

    let summary = h
        .pipeline
        .run_items(
            &task,
            vec![feed_item(1, "First", 500), feed_item(2, "Second", 500)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.rejected, 1);
    let (disposition, reason) = disposition_of(&h.db, "Second").await;
    assert_eq!(disposition, Disposition::Rejected);
    assert_eq!(reason.as_deref(), Some("qBit Error"));
    assert!(client.deleted().is_empty());
}

#[tokio::test]
async fn size_floor_rejection_is_recorded() {
    let client = FakeClient::new(10_000, vec![]);
    let h = harness(admission(100), Arc::new(client.clone()), StaticDetails::default()).await;
    let mut task = insert_task(&h.db, "https://pt.example.org/rss").await;
    task.min_size_mb = 1;

    h.pipeline
        .run_items(
            &task,
            vec![feed_item(1, "Small", 1024)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let (disposition, reason) = disposition_of(&h.db, "Small").await;
    assert_eq!(disposition, Disposition::Rejected);
    assert_eq!(reason.as_deref(), Some("SIZE_MIN"));
    assert!(client.added().is_empty());
}

#[tokio::test]
async fn unconfigured_client_rejects_accepted_entries() {
    let h = harness(
        admission(100),
        Arc::new(UnconfiguredClient),
        StaticDetails::default(),
    )
    .await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;

    let summary = h
        .pipeline
        .run_items(
            &task,
            vec![feed_item(1, "Movie", 10)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.rejected, 1);
    let (disposition, reason) = disposition_of(&h.db, "Movie").await;
    assert_eq!(disposition, Disposition::Rejected);
    assert_eq!(reason.as_deref(), Some("qBit Error"));
}

#[tokio::test]
async fn failed_submission_is_not_retried_in_the_run() {
    let client = FakeClient::new(10_000, vec![]);
    client.fail_add();
    let h = harness(admission(100), Arc::new(client.clone()), StaticDetails::default()).await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;

    let summary = h
        .pipeline
        .run_items(
            &task,
            vec![feed_item(1, "Movie", 10), feed_item(2, "Other", 10)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.downloaded, 0);
    let stored = h.db.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(stored.accept_count, 0);
}

#[tokio::test]
async fn missing_free_space_rejects_without_touching_client() {
    let client = FakeClient::new(0, vec![remote("old", 1.0, 10_000, 5)]);
    client.fail_free_space();
    let h = harness(admission(100), Arc::new(client.clone()), StaticDetails::default()).await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;

    h.pipeline
        .run_items(
            &task,
            vec![feed_item(1, "Movie", 10)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        disposition_of(&h.db, "Movie").await.1.as_deref(),
        Some("qBit Error")
    );
    assert!(client.deleted().is_empty());
    assert!(client.added().is_empty());
}

#[tokio::test]
async fn dry_run_marks_downloaded_without_client_calls() {
    let client = FakeClient::new(0, vec![remote("old", 1.0, 10_000, 5)]);
    let config = AdmissionConfig {
        dry_run: true,
        ..admission(100)
    };
    let h = harness(config, Arc::new(client.clone()), StaticDetails::default()).await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;

    let summary = h
        .pipeline
        .run_items(
            &task,
            vec![feed_item(1, "Movie", 10)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(
        disposition_of(&h.db, "Movie").await.0,
        Disposition::Downloaded
    );
    assert!(client.added().is_empty());
    assert!(client.deleted().is_empty());
}

#[tokio::test]
async fn accept_count_accumulates_across_runs() {
    let client = FakeClient::new(1_000_000, vec![]);
    let h = harness(admission(100), Arc::new(client), StaticDetails::default()).await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;
    let cancel = CancellationToken::new();

    h.pipeline
        .run_items(&task, vec![feed_item(1, "A", 10)], &cancel)
        .await
        .unwrap();
    h.pipeline
        .run_items(
            &task,
            vec![feed_item(2, "B", 10), feed_item(3, "C", 10)],
            &cancel,
        )
        .await
        .unwrap();

    let stored = h.db.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(stored.accept_count, 3);
    assert!(h.db.get_task_last_run(task.id).await.unwrap().is_some());
}

#[tokio::test]
async fn cancelled_run_processes_nothing() {
    let client = FakeClient::new(10_000, vec![]);
    let h = harness(admission(100), Arc::new(client.clone()), StaticDetails::default()).await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = h
        .pipeline
        .run_items(&task, vec![feed_item(1, "A", 10)], &cancel)
        .await
        .unwrap();

    assert_eq!(summary, RunSummary::default());
    assert_eq!(h.db.count_history(None).await.unwrap(), 0);
    assert!(client.added().is_empty());
}

#[tokio::test]
async fn concurrent_runs_do_not_overcommit_storage() {
    let client = FakeClient::new(1_000, vec![]);
    let h = harness(admission(100), Arc::new(client.clone()), StaticDetails::default()).await;
    let first = insert_task(&h.db, "https://a.example.org/rss").await;
    let second = insert_task(&h.db, "https://b.example.org/rss").await;
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(
        h.pipeline
            .run_items(&first, vec![feed_item(1, "From.A", 600)], &cancel),
        h.pipeline
            .run_items(&second, vec![feed_item(2, "From.B", 600)], &cancel),
    );

    let downloaded = a.unwrap().downloaded + b.unwrap().downloaded;
    assert_eq!(downloaded, 1);
    assert_eq!(client.added().len(), 1);
}

#[tokio::test]
async fn admissions_by_other_runs_count_against_an_older_snapshot() {
    // Free space never drops and the first submission is not listed, so only
    // the shared admission ledger can stop the second run
    let client = FakeClient::new(1_000, vec![]);
    client.hide_added();
    let details = StaticDetails::default()
        .with_page("https://pt.example.org/details.php?id=1", "page one")
        .with_page("https://pt.example.org/details.php?id=2", "page two")
        .with_delay(Duration::from_millis(200));
    let h = harness(admission(100), Arc::new(client.clone()), details).await;
    let mut first = insert_task(&h.db, "https://a.example.org/rss").await;
    let mut second = insert_task(&h.db, "https://b.example.org/rss").await;
    first.cookie = Some("uid=1".into());
    second.cookie = Some("uid=2".into());
    let cancel = CancellationToken::new();

    // Both runs snapshot 1000 free bytes, then wait on their detail pages
    let (a, b) = tokio::join!(
        h.pipeline
            .run_items(&first, vec![feed_item(1, "From.A", 600)], &cancel),
        h.pipeline
            .run_items(&second, vec![feed_item(2, "From.B", 600)], &cancel),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.downloaded + b.downloaded, 1);
    assert_eq!(a.rejected + b.rejected, 1);
    assert_eq!(client.added().len(), 1);
    assert!(client.downloads().is_empty());
}

#[tokio::test]
async fn download_link_without_credentials_is_not_submitted() {
    let client = FakeClient::new(10_000, vec![]);
    let h = harness(admission(100), Arc::new(client.clone()), StaticDetails::default()).await;
    let task = insert_task(&h.db, "https://pt.example.org/rss").await;
    let mut item = feed_item(1, "No.Passkey", 10);
    item.links[1].href = "https://pt.example.org/download.php?id=1".into();

    let summary = h
        .pipeline
        .run_items(
            &task,
            vec![item, feed_item(2, "With.Passkey", 10)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(
        disposition_of(&h.db, "No.Passkey").await,
        (Disposition::Rejected, Some("qBit Error".to_string()))
    );
    let added = client.added();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].title, "With.Passkey");
}

#[tokio::test]
async fn events_report_rejections_and_downloads() {
    let client = FakeClient::new(10_000, vec![]);
    let mut h = harness(admission(100), Arc::new(client), StaticDetails::default()).await;
    let mut task = insert_task(&h.db, "https://pt.example.org/rss").await;
    task.title_not_regex = Some("cam".into());

    h.pipeline
        .run_items(
            &task,
            vec![feed_item(1, "Movie.CAM", 10), feed_item(2, "Movie.BluRay", 10)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = h.events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(
        &seen[0],
        Event::EntryRejected { title, reason, .. } if title == "Movie.CAM" && reason == "TITLE_NOT_REGEX"
    ));
    assert!(matches!(
        &seen[1],
        Event::EntryDownloaded { title, size: 10, .. } if title == "Movie.BluRay"
    ));
    assert!(matches!(
        &seen[2],
        Event::RunCompleted { summary, .. } if summary.downloaded == 1 && summary.rejected == 1
    ));
}

#[tokio::test]
async fn invalid_task_pattern_fails_the_run() {
    let client = FakeClient::new(10_000, vec![]);
    let h = harness(admission(100), Arc::new(client), StaticDetails::default()).await;
    let mut task = insert_task(&h.db, "https://pt.example.org/rss").await;
    task.title_regex = Some("[".into());

    let result = h
        .pipeline
        .run_items(&task, vec![feed_item(1, "A", 10)], &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(crate::Error::Config { .. })));
    assert_eq!(h.db.count_history(None).await.unwrap(), 0);
}
