//! Core types for torrss

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique identifier for an RSS task
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for i64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// One structurally valid item parsed from a feed
///
/// Only lives for the duration of a single pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedEntry {
    /// Unique identifier (RSS guid / Atom id)
    pub id: String,
    /// Item title; the deduplication key
    pub title: String,
    /// Detail page URL
    pub detail_link: String,
    /// Actual download URL (the second link of the entry)
    pub download_link: String,
    /// Declared size in bytes (0 when the feed omits or garbles it)
    pub size: u64,
}

/// Disposition of a history record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Record created, filters not yet finished
    Pending,
    /// Rejected by a filter stage or by the download client
    Rejected,
    /// Passed every filter, submission in progress
    Accepted,
    /// Submitted to the download client
    Downloaded,
}

impl Disposition {
    /// Convert integer code to Disposition
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Disposition::Pending,
            1 => Disposition::Rejected,
            2 => Disposition::Accepted,
            3 => Disposition::Downloaded,
            _ => Disposition::Rejected,
        }
    }

    /// Convert Disposition to its integer code
    pub fn to_i32(&self) -> i32 {
        match self {
            Disposition::Pending => 0,
            Disposition::Rejected => 1,
            Disposition::Accepted => 2,
            Disposition::Downloaded => 3,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Disposition::Pending => "pending",
            Disposition::Rejected => "rejected",
            Disposition::Accepted => "accepted",
            Disposition::Downloaded => "downloaded",
        };
        f.write_str(s)
    }
}

/// Why an entry was rejected
///
/// The `Display` form is what gets stored verbatim in the history record's
/// `reason` column.
#[derive(Clone, Debug, PartialEq)]
pub enum RejectReason {
    /// Declared size below the task's floor
    SizeMin,
    /// Title does not match the include regex
    TitleRegex,
    /// Title matches the exclude regex
    TitleNotRegex,
    /// Detail page could not be fetched
    FetchFailed,
    /// Detail page does not match the include regex
    InfoRegex,
    /// Detail page matches the exclude regex
    InfoNotRegex,
    /// Neither rating reached the task's threshold
    Rating {
        /// IMDb score found on the page (0 when absent)
        primary: f64,
        /// Douban score found on the page (0 when absent)
        secondary: f64,
    },
    /// Client missing, unusable download link, client API failure, or no room
    /// even after eviction
    Client,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SizeMin => f.write_str("SIZE_MIN"),
            RejectReason::TitleRegex => f.write_str("TITLE_REGEX"),
            RejectReason::TitleNotRegex => f.write_str("TITLE_NOT_REGEX"),
            RejectReason::FetchFailed => f.write_str("Fetch info page failed"),
            RejectReason::InfoRegex => f.write_str("INFO_REGEX"),
            RejectReason::InfoNotRegex => f.write_str("INFO_NOT_REGEX"),
            RejectReason::Rating { primary, secondary } => {
                write!(f, "IMDb: {}, douban: {}", Score(*primary), Score(*secondary))
            }
            RejectReason::Client => f.write_str("qBit Error"),
        }
    }
}

/// A score as stored in reasons: `0` when absent, otherwise always with a
/// decimal point (`8.0`, `7.5`)
struct Score(f64);

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0.0 {
            f.write_str("0")
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Durable audit row for one feed entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Database ID
    pub id: i64,
    /// Task that saw the entry
    pub task_id: TaskId,
    /// Site label of the task
    pub site: String,
    /// Entry title (dedup key)
    pub title: String,
    /// Detail page URL
    pub info_link: String,
    /// Download URL
    pub download_link: String,
    /// Declared size in bytes
    pub size: u64,
    /// Current disposition
    pub disposition: Disposition,
    /// Rejection reason, verbatim
    pub reason: Option<String>,
    /// External rating identifier (e.g. `tt0111161`)
    pub imdb_id: Option<String>,
    /// When the record was created
    pub added_at: DateTime<Utc>,
}

/// An accepted entry about to be submitted to the download client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadCandidate {
    /// Entry title
    pub title: String,
    /// Declared size in bytes
    pub size: u64,
    /// Final download URL
    pub url: String,
    /// Save path inside the client (site id string)
    pub save_path: Option<String>,
    /// Client category / label
    pub category: Option<String>,
    /// Rating identifier used as tag
    pub tag: Option<String>,
}

/// Snapshot of one item known to the download client
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteDownload {
    /// Info hash
    pub hash: String,
    /// Display name
    pub name: String,
    /// Declared total size in bytes
    pub total_size: u64,
    /// Bytes downloaded so far
    pub downloaded: u64,
    /// Bytes remaining
    pub amount_left: u64,
    /// Progress fraction in [0, 1]
    pub progress: f64,
    /// Cumulative seeding duration
    pub seeding_time: Duration,
    /// Client category
    pub category: Option<String>,
    /// Client tags
    pub tags: Vec<String>,
}

impl RemoteDownload {
    /// Whether the download has finished (progress reached 1.0)
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Counters for one pipeline run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Entries present in the feed
    pub total: usize,
    /// Entries skipped because their title was already in history
    pub skipped: usize,
    /// Entries dropped for missing fields
    pub malformed: usize,
    /// Entries rejected by a filter or by the client
    pub rejected: usize,
    /// Entries submitted to the client
    pub downloaded: usize,
}

/// Event emitted during admission runs
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An entry was rejected
    EntryRejected {
        /// Task ID
        task_id: TaskId,
        /// Entry title
        title: String,
        /// Rejection reason
        reason: String,
    },

    /// An entry was handed to the download client
    EntryDownloaded {
        /// Task ID
        task_id: TaskId,
        /// Entry title
        title: String,
        /// Declared size in bytes
        size: u64,
    },

    /// A completed download was removed to make room
    DownloadEvicted {
        /// Info hash
        hash: String,
        /// Display name
        name: String,
        /// Bytes reclaimed
        reclaimed: u64,
    },

    /// A task run finished
    RunCompleted {
        /// Task ID
        task_id: TaskId,
        /// Counters for the run
        summary: RunSummary,
    },

    /// A task run failed before processing its entries
    RunFailed {
        /// Task ID
        task_id: TaskId,
        /// Error message
        error: String,
    },

    /// The service is shutting down
    Shutdown,
}
