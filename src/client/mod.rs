//! Download client abstraction.
//!
//! The admission pipeline needs four operations from the torrent client:
//! list what it holds, report free space, add a download and delete one.
//! [`QBittorrentClient`] implements them against the qBittorrent Web API;
//! [`UnconfiguredClient`] stands in when no client URL is configured and
//! refuses every call with [`ClientError::NotConfigured`].

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::{DownloadCandidate, RemoteDownload};
use async_trait::async_trait;
use std::sync::Arc;

mod qbittorrent;

pub use qbittorrent::QBittorrentClient;

/// Result type for download client calls
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Operations the admission pipeline performs on the download client
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Every download the client currently holds
    async fn list_downloads(&self) -> ClientResult<Vec<RemoteDownload>>;

    /// Free bytes on the client's download volume
    async fn free_space(&self) -> ClientResult<u64>;

    /// Submit a download
    async fn add_download(&self, candidate: &DownloadCandidate) -> ClientResult<()>;

    /// Remove a download, optionally with its data
    async fn delete_download(&self, hash: &str, with_data: bool) -> ClientResult<()>;
}

/// Client used when no client URL is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredClient;

#[async_trait]
impl DownloadClient for UnconfiguredClient {
    async fn list_downloads(&self) -> ClientResult<Vec<RemoteDownload>> {
        Err(ClientError::NotConfigured)
    }

    async fn free_space(&self) -> ClientResult<u64> {
        Err(ClientError::NotConfigured)
    }

    async fn add_download(&self, _candidate: &DownloadCandidate) -> ClientResult<()> {
        Err(ClientError::NotConfigured)
    }

    async fn delete_download(&self, _hash: &str, _with_data: bool) -> ClientResult<()> {
        Err(ClientError::NotConfigured)
    }
}

/// Build the client described by `config`
///
/// A missing or blank URL yields [`UnconfiguredClient`].
pub fn from_config(config: &ClientConfig) -> Result<Arc<dyn DownloadClient>> {
    match config.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Ok(Arc::new(QBittorrentClient::new(
            url,
            &config.username,
            &config.password,
            config.request_timeout,
        )?)),
        None => {
            tracing::warn!("no download client URL configured; accepted entries will be rejected");
            Ok(Arc::new(UnconfiguredClient))
        }
    }
}
