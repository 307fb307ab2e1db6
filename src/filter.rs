//! Ordered filter chain for feed entries.
//!
//! Stages run in a fixed order and stop at the first rejection:
//!
//! 1. structural validity (no record is created for malformed items)
//! 2. title deduplication against history (silent skip)
//! 3. size floor
//! 4. title include / 5. title exclude
//! 6. cookie-less tasks accept here
//! 7. detail page fetch
//! 8. detail include / 9. detail exclude
//! 10. rating floor
//!
//! A pending history record is created right after deduplication and every
//! later stage commits its outcome to it before the next stage runs.

use crate::config::TaskConfig;
use crate::db::{Database, NewHistoryRecord};
use crate::detail::DetailSource;
use crate::error::{Error, Result};
use crate::feed::FeedItem;
use crate::rating::RatingExtractor;
use crate::types::{Disposition, FeedEntry, RejectReason};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use tracing::debug;

/// Outcome of running one feed item through the chain
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// Every stage passed; the record is now `accepted`
    Accept {
        /// History record of the entry
        record_id: i64,
        /// The validated entry
        entry: FeedEntry,
        /// Rating identifier found on the detail page
        imdb_id: Option<String>,
    },
    /// A stage rejected the entry; the reason is already stored
    Reject {
        /// History record of the entry
        record_id: i64,
        /// Entry title
        title: String,
        /// Why the entry was rejected
        reason: RejectReason,
    },
    /// Title already in history; nothing was written
    Duplicate {
        /// Entry title
        title: String,
    },
    /// Item lacks required fields; nothing was written
    Malformed,
}

/// Filter chain compiled for one task
pub struct FilterChain {
    task: TaskConfig,
    title_include: Option<Regex>,
    title_exclude: Option<Regex>,
    info_include: Option<Regex>,
    info_exclude: Option<Regex>,
    ratings: RatingExtractor,
    db: Arc<Database>,
    details: Arc<dyn DetailSource>,
}

impl FilterChain {
    /// Compile the task's patterns
    ///
    /// Fails with [`Error::Config`] naming the offending field if any pattern
    /// is invalid, before a single entry has been touched.
    pub fn new(
        task: TaskConfig,
        db: Arc<Database>,
        details: Arc<dyn DetailSource>,
    ) -> Result<Self> {
        let title_include = compile_pattern(task.title_regex.as_deref(), "title_regex", true)?;
        let title_exclude =
            compile_pattern(task.title_not_regex.as_deref(), "title_not_regex", true)?;
        let info_include = compile_pattern(task.info_regex.as_deref(), "info_regex", false)?;
        let info_exclude =
            compile_pattern(task.info_not_regex.as_deref(), "info_not_regex", false)?;

        Ok(Self {
            task,
            title_include,
            title_exclude,
            info_include,
            info_exclude,
            ratings: RatingExtractor::new(),
            db,
            details,
        })
    }

    /// The task this chain was compiled for
    pub fn task(&self) -> &TaskConfig {
        &self.task
    }

    /// Run one feed item through every stage
    ///
    /// Only database failures are returned as `Err`; every other failure is a
    /// [`Decision::Reject`] with its reason stored on the record.
    pub async fn evaluate(&self, item: FeedItem) -> Result<Decision> {
        let Some(entry) = item.into_entry() else {
            return Ok(Decision::Malformed);
        };

        if self.db.history_title_exists(&entry.title).await? {
            return Ok(Decision::Duplicate { title: entry.title });
        }

        let record = NewHistoryRecord {
            task_id: self.task.id,
            site: &self.task.site,
            title: &entry.title,
            info_link: &entry.detail_link,
            download_link: &entry.download_link,
            size: entry.size,
        };
        let Some(record_id) = self.db.insert_history_record(&record).await? else {
            // Another task recorded the same title between our check and insert
            return Ok(Decision::Duplicate { title: entry.title });
        };

        match self.run_stages(record_id, &entry).await? {
            Ok(imdb_id) => {
                self.db
                    .set_history_disposition(record_id, Disposition::Accepted)
                    .await?;
                debug!(task_id = %self.task.id, title = %entry.title, "entry accepted by filters");
                Ok(Decision::Accept {
                    record_id,
                    entry,
                    imdb_id,
                })
            }
            Err(reason) => {
                self.db
                    .set_history_reason(record_id, &reason.to_string())
                    .await?;
                debug!(task_id = %self.task.id, title = %entry.title, %reason, "entry rejected");
                Ok(Decision::Reject {
                    record_id,
                    title: entry.title,
                    reason,
                })
            }
        }
    }

    /// Stages 3 to 10; the inner result is the rating identifier on success
    async fn run_stages(
        &self,
        record_id: i64,
        entry: &FeedEntry,
    ) -> Result<std::result::Result<Option<String>, RejectReason>> {
        let size_mb = entry.size as f64 / 1024.0 / 1024.0;
        if size_mb < self.task.min_size_mb as f64 {
            return Ok(Err(RejectReason::SizeMin));
        }

        if let Some(re) = &self.title_include
            && !re.is_match(&entry.title)
        {
            return Ok(Err(RejectReason::TitleRegex));
        }
        if let Some(re) = &self.title_exclude
            && re.is_match(&entry.title)
        {
            return Ok(Err(RejectReason::TitleNotRegex));
        }

        let Some(cookie) = self.task.session_cookie() else {
            return Ok(Ok(None));
        };

        let page = match self.details.fetch(&entry.detail_link, cookie).await {
            Ok(page) if !page.trim().is_empty() => page,
            Ok(_) => {
                debug!(task_id = %self.task.id, url = %entry.detail_link, "detail page is empty");
                return Ok(Err(RejectReason::FetchFailed));
            }
            Err(e) => {
                debug!(task_id = %self.task.id, url = %entry.detail_link, error = %e, "detail fetch failed");
                return Ok(Err(RejectReason::FetchFailed));
            }
        };

        let imdb_id = self.ratings.extract_imdb_id(&page);
        if let Some(id) = &imdb_id {
            self.db.set_history_imdb_id(record_id, id).await?;
        }

        if let Some(re) = &self.info_include
            && !re.is_match(&page)
        {
            return Ok(Err(RejectReason::InfoRegex));
        }
        if let Some(re) = &self.info_exclude
            && re.is_match(&page)
        {
            return Ok(Err(RejectReason::InfoNotRegex));
        }

        if let Some(threshold) = self.task.rating_threshold() {
            let ratings = self.ratings.extract(&page);
            if !ratings.meets(threshold) {
                return Ok(Err(RejectReason::Rating {
                    primary: ratings.imdb,
                    secondary: ratings.douban,
                }));
            }
        }

        Ok(Ok(imdb_id))
    }
}

/// Compile an optional pattern; blank patterns count as unset
///
/// Patterns run in Unicode mode, so `\d`, `\w` and `\s` also match non-ASCII
/// digits, letters and spaces. Write `[0-9]` or `(?-u:\d)` where only ASCII
/// should match.
fn compile_pattern(
    pattern: Option<&str>,
    key: &str,
    case_insensitive: bool,
) -> Result<Option<Regex>> {
    let Some(pattern) = pattern.filter(|p| !p.trim().is_empty()) else {
        return Ok(None);
    };
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .size_limit(1024 * 1024) // 1MB compiled DFA limit
        .build()
        .map(Some)
        .map_err(|e| Error::config(key, format!("invalid pattern '{}': {}", pattern, e)))
}
