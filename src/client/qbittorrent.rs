//! qBittorrent Web API (v2) client.

use super::{ClientResult, DownloadClient};
use crate::error::{ClientError, Error, Result};
use crate::types::{DownloadCandidate, RemoteDownload};
use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::multipart::Form;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Torrent as reported by `GET /api/v2/torrents/info`
#[derive(Debug, Deserialize)]
struct TorrentInfo {
    hash: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    total_size: i64,
    #[serde(default)]
    downloaded: i64,
    #[serde(default)]
    amount_left: i64,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    seeding_time: i64,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: String,
}

impl From<TorrentInfo> for RemoteDownload {
    fn from(t: TorrentInfo) -> Self {
        RemoteDownload {
            hash: t.hash,
            name: t.name,
            total_size: t.total_size.max(0) as u64,
            downloaded: t.downloaded.max(0) as u64,
            amount_left: t.amount_left.max(0) as u64,
            progress: t.progress,
            seeding_time: Duration::from_secs(t.seeding_time.max(0) as u64),
            category: Some(t.category).filter(|c| !c.is_empty()),
            tags: t
                .tags
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Subset of `GET /api/v2/sync/maindata`
#[derive(Debug, Deserialize)]
struct SyncMainData {
    #[serde(default)]
    server_state: Option<ServerState>,
}

#[derive(Debug, Deserialize)]
struct ServerState {
    #[serde(default)]
    free_space_on_disk: Option<i64>,
}

/// qBittorrent client authenticated with a session cookie
///
/// The `SID` cookie from the login response is attached to every request.
/// A request answered with 403 triggers one fresh login and one retry.
pub struct QBittorrentClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    sid: RwLock<Option<String>>,
}

impl QBittorrentClient {
    /// Create a client for the Web UI at `base_url`
    pub fn new(base_url: &str, username: &str, password: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| Error::config("client.url", format!("invalid client URL: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            sid: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2{}", self.base_url, path)
    }

    /// Log in and store the session cookie
    /// POST /api/v2/auth/login
    pub async fn login(&self) -> ClientResult<()> {
        let params = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];
        let response = self
            .http
            .post(self.url("/auth/login"))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let sid = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|c| c.split(';').next())
            .find_map(|c| c.trim().strip_prefix("SID=").map(str::to_string));
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() || body.trim() == "Fails." {
            return Err(ClientError::Auth(format!(
                "login failed: {} - {}",
                status.as_u16(),
                body.trim()
            )));
        }

        // Clients with auth bypass for local networks answer "Ok." without a cookie
        *self.sid.write().await = sid;
        debug!("logged in to qBittorrent");
        Ok(())
    }

    /// Send a request built by `build`, logging in first if needed and once
    /// more on 403
    async fn send<F>(&self, build: F) -> ClientResult<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        if self.sid.read().await.is_none() {
            self.login().await?;
        }

        let response = self.send_with_sid(&build).await?;
        if response.status() != StatusCode::FORBIDDEN {
            return check_status(response).await;
        }

        debug!("qBittorrent session expired, logging in again");
        self.login().await?;
        let response = self.send_with_sid(&build).await?;
        check_status(response).await
    }

    async fn send_with_sid<F>(&self, build: &F) -> ClientResult<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder + Send + Sync,
    {
        let mut request = build(&self.http);
        if let Some(sid) = self.sid.read().await.as_deref() {
            request = request.header(COOKIE, format!("SID={}", sid));
        }
        Ok(request.send().await?)
    }
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status_code: status.as_u16(),
        message,
    })
}

#[async_trait]
impl DownloadClient for QBittorrentClient {
    async fn list_downloads(&self) -> ClientResult<Vec<RemoteDownload>> {
        let url = self.url("/torrents/info");
        let response = self.send(|http| http.get(&url)).await?;
        let torrents = response
            .json::<Vec<TorrentInfo>>()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("torrent list: {e}")))?;

        Ok(torrents.into_iter().map(RemoteDownload::from).collect())
    }

    async fn free_space(&self) -> ClientResult<u64> {
        let url = self.url("/sync/maindata");
        let response = self
            .send(|http| http.get(&url).query(&[("rid", "0")]))
            .await?;
        let data = response
            .json::<SyncMainData>()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("main data: {e}")))?;

        data.server_state
            .and_then(|s| s.free_space_on_disk)
            .map(|free| free.max(0) as u64)
            .ok_or_else(|| ClientError::InvalidResponse("free_space_on_disk missing".into()))
    }

    async fn add_download(&self, candidate: &DownloadCandidate) -> ClientResult<()> {
        let url = self.url("/torrents/add");
        let response = self
            .send(|http| {
                // Automatic management would move the data under the category path
                let mut form = Form::new()
                    .text("urls", candidate.url.clone())
                    .text("autoTMM", "false");
                if let Some(path) = &candidate.save_path {
                    form = form.text("savepath", path.clone());
                }
                if let Some(category) = &candidate.category {
                    form = form.text("category", category.clone());
                }
                if let Some(tag) = &candidate.tag {
                    form = form.text("tags", tag.clone());
                }
                http.post(&url).multipart(form)
            })
            .await?;

        // Rejected URLs come back as 200 with a "Fails." body
        let body = response.text().await.unwrap_or_default();
        if body.trim() == "Fails." {
            return Err(ClientError::Api {
                status_code: 200,
                message: body,
            });
        }
        Ok(())
    }

    async fn delete_download(&self, hash: &str, with_data: bool) -> ClientResult<()> {
        let url = self.url("/torrents/delete");
        let delete_files = if with_data { "true" } else { "false" };
        self.send(|http| {
            http.post(&url)
                .form(&[("hashes", hash), ("deleteFiles", delete_files)])
        })
        .await?;
        Ok(())
    }
}
