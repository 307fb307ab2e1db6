//! Shared fakes for unit tests.

use crate::client::{ClientResult, DownloadClient};
use crate::db::Database;
use crate::detail::DetailSource;
use crate::error::{ClientError, Error, Result};
use crate::feed::{FeedItem, FeedLink};
use crate::types::{DownloadCandidate, RemoteDownload};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Fresh database in a temp file; keep the file alive for the test's duration
pub(crate) async fn setup_db() -> (Arc<Database>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (Arc::new(db), temp_file)
}

/// A client-side download; complete ones have `bytes` downloaded, incomplete
/// ones have `bytes` left
pub(crate) fn remote(hash: &str, progress: f64, bytes: u64, seeding_secs: u64) -> RemoteDownload {
    let complete = progress >= 1.0;
    RemoteDownload {
        hash: hash.to_string(),
        name: format!("{hash}.name"),
        total_size: bytes,
        downloaded: if complete { bytes } else { 0 },
        amount_left: if complete { 0 } else { bytes },
        progress,
        seeding_time: Duration::from_secs(seeding_secs),
        category: None,
        tags: Vec::new(),
    }
}

/// A well-formed feed item with predictable links
pub(crate) fn feed_item(n: u32, title: &str, size: u64) -> FeedItem {
    let detail = format!("https://pt.example.org/details.php?id={n}");
    FeedItem {
        id: Some(format!("guid-{n}")),
        title: Some(title.to_string()),
        link: Some(detail.clone()),
        links: vec![
            FeedLink {
                href: detail,
                length: None,
            },
            FeedLink {
                href: format!("https://pt.example.org/download.php?id={n}&passkey=abc"),
                length: Some(size.to_string()),
            },
        ],
    }
}

#[derive(Default)]
struct FakeState {
    free_space: Option<u64>,
    downloads: Vec<RemoteDownload>,
    added: Vec<DownloadCandidate>,
    deleted: Vec<String>,
    failing_deletes: HashSet<String>,
    fail_add: bool,
    hide_added: bool,
}

/// In-memory download client
///
/// Deleting a download removes it and credits its bytes to free space; adding
/// one records the candidate and lists it as an incomplete download.
#[derive(Clone, Default)]
pub(crate) struct FakeClient {
    state: Arc<Mutex<FakeState>>,
}

impl FakeClient {
    pub(crate) fn new(free_space: u64, downloads: Vec<RemoteDownload>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                free_space: Some(free_space),
                downloads,
                ..FakeState::default()
            })),
        }
    }

    pub(crate) fn downloads(&self) -> Vec<RemoteDownload> {
        self.state.lock().unwrap().downloads.clone()
    }

    pub(crate) fn added(&self) -> Vec<DownloadCandidate> {
        self.state.lock().unwrap().added.clone()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub(crate) fn fail_delete(&self, hash: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(hash.to_string());
    }

    pub(crate) fn fail_add(&self) {
        self.state.lock().unwrap().fail_add = true;
    }

    /// Accept submissions without listing them, like a client that has not
    /// picked the torrent up yet
    pub(crate) fn hide_added(&self) {
        self.state.lock().unwrap().hide_added = true;
    }

    pub(crate) fn fail_free_space(&self) {
        self.state.lock().unwrap().free_space = None;
    }
}

#[async_trait]
impl DownloadClient for FakeClient {
    async fn list_downloads(&self) -> ClientResult<Vec<RemoteDownload>> {
        Ok(self.downloads())
    }

    async fn free_space(&self) -> ClientResult<u64> {
        self.state
            .lock()
            .unwrap()
            .free_space
            .ok_or_else(|| ClientError::InvalidResponse("free space unavailable".into()))
    }

    async fn add_download(&self, candidate: &DownloadCandidate) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_add {
            return Err(ClientError::Api {
                status_code: 500,
                message: "add failed".into(),
            });
        }
        state.added.push(candidate.clone());
        if state.hide_added {
            return Ok(());
        }
        // A fresh download reserves its whole size until it completes
        let hash = format!("added-{}", state.added.len());
        let mut download = remote(&hash, 0.0, candidate.size, 0);
        download.name = candidate.title.clone();
        state.downloads.push(download);
        Ok(())
    }

    async fn delete_download(&self, hash: &str, _with_data: bool) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_deletes.contains(hash) {
            return Err(ClientError::Api {
                status_code: 500,
                message: "delete failed".into(),
            });
        }
        if let Some(pos) = state.downloads.iter().position(|d| d.hash == hash) {
            let removed = state.downloads.remove(pos);
            if let Some(free) = state.free_space.as_mut() {
                *free += removed.downloaded;
            }
        }
        state.deleted.push(hash.to_string());
        Ok(())
    }
}

/// Detail pages served from memory; unknown URLs fail
#[derive(Clone, Default)]
pub(crate) struct StaticDetails {
    pages: Arc<Mutex<HashMap<String, String>>>,
    fetches: Arc<Mutex<usize>>,
    delay: Duration,
}

impl StaticDetails {
    pub(crate) fn with_page(self, url: &str, body: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
        self
    }

    /// Answer every fetch after `delay`
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl DetailSource for StaticDetails {
    async fn fetch(&self, url: &str, _cookie: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *self.fetches.lock().unwrap() += 1;
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Other(format!("no page for {url}")))
    }
}
