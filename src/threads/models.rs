/// Thread data model
use crate::error::{SkeinError, SkeinResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// Kind of media attached to a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// Media attachment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub url: String,
    pub kind: MediaKind,
}

/// A stored thread. `replies_count` counts direct replies only;
/// `reposted_from`/`reposted_from_reply` mark this thread as a repost of at
/// most one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub media_url: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub likes_count: i64,
    pub replies_count: i64,
    pub reposts_count: i64,
    pub reposted_from: Option<String>,
    pub reposted_from_reply: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// The source this thread counts as a repost of: its origin when it is
    /// a repost, itself otherwise. Repost chains resolve one level only.
    pub fn repost_source_id(&self) -> &str {
        self.reposted_from.as_deref().unwrap_or(&self.id)
    }
}

/// Parameters for creating a thread
#[derive(Debug, Clone, Default)]
pub struct NewThread {
    pub author_id: String,
    pub content: String,
    pub media: Option<Media>,
}

/// Convert a database row to a Thread
pub(crate) fn row_to_thread(row: &sqlx::sqlite::SqliteRow) -> SkeinResult<Thread> {
    let media_kind: Option<String> = row.try_get("media_kind")?;
    let media_kind = match media_kind {
        Some(s) => Some(
            MediaKind::parse(&s)
                .ok_or_else(|| SkeinError::Integrity(format!("Unknown media kind {}", s)))?,
        ),
        None => None,
    };

    Ok(Thread {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        content: row.try_get("content")?,
        media_url: row.try_get("media_url")?,
        media_kind,
        likes_count: row.try_get("likes_count")?,
        replies_count: row.try_get("replies_count")?,
        reposts_count: row.try_get("reposts_count")?,
        reposted_from: row.try_get("reposted_from")?,
        reposted_from_reply: row.try_get("reposted_from_reply")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
