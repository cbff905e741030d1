/// Reply data model
use crate::error::SkeinResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// A stored reply. A null `parent_reply_id` marks a top-level reply; the
/// parent chain is acyclic and confined to the owning thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    pub thread_id: String,
    pub author_id: String,
    pub parent_reply_id: Option<String>,
    pub content: String,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a reply
#[derive(Debug, Clone, Default)]
pub struct NewReply {
    pub author_id: String,
    pub thread_id: String,
    pub parent_reply_id: Option<String>,
    pub content: String,
}

/// Convert a database row to a Reply
pub(crate) fn row_to_reply(row: &sqlx::sqlite::SqliteRow) -> SkeinResult<Reply> {
    Ok(Reply {
        id: row.try_get("id")?,
        thread_id: row.try_get("thread_id")?,
        author_id: row.try_get("author_id")?,
        parent_reply_id: row.try_get("parent_reply_id")?,
        content: row.try_get("content")?,
        likes_count: row.try_get("likes_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
