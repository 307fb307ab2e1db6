//! Feed fetching and parsing.
//!
//! Tracker feeds come as RSS 2.0 or Atom. Both are flattened into
//! [`FeedItem`]s whose `links` mirror the order the site publishes them: the
//! detail page first, the actual download second. [`FeedItem::into_entry`]
//! then enforces the structural requirements of the admission pipeline.

use crate::error::{Error, Result};
use crate::types::FeedEntry;
use std::time::Duration;
use tracing::debug;

/// One link attached to a feed item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedLink {
    /// Target URL
    pub href: String,
    /// Declared length in bytes, as published (may be garbled)
    pub length: Option<String>,
}

/// A feed item as parsed, before structural validation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedItem {
    /// RSS guid or Atom id
    pub id: Option<String>,
    /// Item title
    pub title: Option<String>,
    /// Detail page URL
    pub link: Option<String>,
    /// All links in publication order
    pub links: Vec<FeedLink>,
}

impl FeedItem {
    /// Validate the item into a [`FeedEntry`]
    ///
    /// Returns `None` if the id, title or detail link is missing or blank, or
    /// if there is no second link to download from. A missing or unparseable
    /// length on the download link yields a size of 0.
    pub fn into_entry(self) -> Option<FeedEntry> {
        let id = self.id.filter(|s| !s.trim().is_empty())?;
        let title = self.title.filter(|s| !s.trim().is_empty())?;
        let detail_link = self.link.filter(|s| !s.trim().is_empty())?;
        let download = self.links.into_iter().nth(1)?;
        if download.href.trim().is_empty() {
            return None;
        }
        let size = download
            .length
            .and_then(|l| l.trim().parse::<u64>().ok())
            .unwrap_or(0);

        Some(FeedEntry {
            id,
            title,
            detail_link,
            download_link: download.href,
            size,
        })
    }
}

/// Fetches and parses feed documents
pub struct FeedReader {
    http_client: reqwest::Client,
}

impl FeedReader {
    /// Create a reader with the given request timeout and user agent
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// Fetch `url` and parse it as RSS, falling back to Atom
    pub async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>> {
        debug!(url, "fetching feed");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Feed(format!("Failed to fetch feed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Feed(format!(
                "feed returned HTTP {}: {}",
                status.as_u16(),
                url
            )));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| Error::Feed(format!("Failed to read feed content: {}", e)))?;

        parse_feed(&content)
    }
}

/// Parse a feed document, trying RSS first and then Atom
pub fn parse_feed(content: &[u8]) -> Result<Vec<FeedItem>> {
    match parse_as_rss(content) {
        Ok(items) => {
            debug!("parsed feed as RSS, found {} items", items.len());
            Ok(items)
        }
        Err(rss_err) => match parse_as_atom(content) {
            Ok(items) => {
                debug!("parsed feed as Atom, found {} items", items.len());
                Ok(items)
            }
            Err(atom_err) => Err(Error::Feed(format!(
                "Failed to parse feed as RSS or Atom. RSS error: {}. Atom error: {}",
                rss_err, atom_err
            ))),
        },
    }
}

fn parse_as_rss(content: &[u8]) -> std::result::Result<Vec<FeedItem>, rss::Error> {
    let channel = rss::Channel::read_from(content)?;

    let items = channel
        .items()
        .iter()
        .map(|item| {
            let mut links = Vec::with_capacity(2);
            if let Some(link) = item.link() {
                links.push(FeedLink {
                    href: link.to_string(),
                    length: None,
                });
            }
            if let Some(enclosure) = item.enclosure() {
                links.push(FeedLink {
                    href: enclosure.url().to_string(),
                    length: Some(enclosure.length().to_string()),
                });
            }

            FeedItem {
                id: item.guid().map(|g| g.value().to_string()),
                title: item.title().map(str::to_string),
                link: item.link().map(str::to_string),
                links,
            }
        })
        .collect();

    Ok(items)
}

fn parse_as_atom(content: &[u8]) -> std::result::Result<Vec<FeedItem>, atom_syndication::Error> {
    let feed = atom_syndication::Feed::read_from(content)?;

    let items = feed
        .entries()
        .iter()
        .map(|entry| {
            let links: Vec<FeedLink> = entry
                .links()
                .iter()
                .map(|link| FeedLink {
                    href: link.href().to_string(),
                    length: link.length().map(str::to_string),
                })
                .collect();

            FeedItem {
                id: Some(entry.id().to_string()),
                title: Some(entry.title().as_str().to_string()),
                link: links.first().map(|l| l.href.clone()),
                links,
            }
        })
        .collect();

    Ok(items)
}
