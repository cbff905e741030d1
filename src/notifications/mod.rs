/// Notification engine
///
/// Creates preference-gated, deduplicated notifications, detects mentions in
/// message text and hands finished notifications to the realtime gateway and
/// the mailer for delivery.
pub mod engine;
pub mod mentions;

pub use engine::{CreateNotification, NotificationEngine};
pub use mentions::detect_mentions;

use crate::error::{SkeinError, SkeinResult};
use crate::identity::UserView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// Kinds of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewFollower,
    FollowRequest,
    FollowAccepted,
    ThreadLike,
    ReplyLike,
    ThreadReply,
    ThreadRepost,
    Mention,
    ContentValidated,
    ContentFlagged,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewFollower => "new_follower",
            NotificationType::FollowRequest => "follow_request",
            NotificationType::FollowAccepted => "follow_accepted",
            NotificationType::ThreadLike => "thread_like",
            NotificationType::ReplyLike => "reply_like",
            NotificationType::ThreadReply => "thread_reply",
            NotificationType::ThreadRepost => "thread_repost",
            NotificationType::Mention => "mention",
            NotificationType::ContentValidated => "content_validated",
            NotificationType::ContentFlagged => "content_flagged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_follower" => Some(NotificationType::NewFollower),
            "follow_request" => Some(NotificationType::FollowRequest),
            "follow_accepted" => Some(NotificationType::FollowAccepted),
            "thread_like" => Some(NotificationType::ThreadLike),
            "reply_like" => Some(NotificationType::ReplyLike),
            "thread_reply" => Some(NotificationType::ThreadReply),
            "thread_repost" => Some(NotificationType::ThreadRepost),
            "mention" => Some(NotificationType::Mention),
            "content_validated" => Some(NotificationType::ContentValidated),
            "content_flagged" => Some(NotificationType::ContentFlagged),
            _ => None,
        }
    }
}

/// A stored notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub notif_type: NotificationType,
    pub recipient_id: String,
    pub sender_id: String,
    pub thread_id: Option<String>,
    pub reply_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification projection with the sender resolved, used for listings and
/// realtime pushes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    #[serde(rename = "type")]
    pub notif_type: NotificationType,
    pub sender: UserView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Convert a database row to a Notification
pub(crate) fn row_to_notification(row: &sqlx::sqlite::SqliteRow) -> SkeinResult<Notification> {
    let type_str: String = row.try_get("notif_type")?;
    let notif_type = NotificationType::parse(&type_str)
        .ok_or_else(|| SkeinError::Integrity(format!("Unknown notification type {}", type_str)))?;

    Ok(Notification {
        id: row.try_get("id")?,
        notif_type,
        recipient_id: row.try_get("recipient_id")?,
        sender_id: row.try_get("sender_id")?,
        thread_id: row.try_get("thread_id")?,
        reply_id: row.try_get("reply_id")?,
        read: row.try_get("read")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_strings_round_trip() {
        for t in [
            NotificationType::NewFollower,
            NotificationType::FollowRequest,
            NotificationType::FollowAccepted,
            NotificationType::ThreadLike,
            NotificationType::ReplyLike,
            NotificationType::ThreadReply,
            NotificationType::ThreadRepost,
            NotificationType::Mention,
            NotificationType::ContentValidated,
            NotificationType::ContentFlagged,
        ] {
            assert_eq!(NotificationType::parse(t.as_str()), Some(t));
        }
        assert_eq!(NotificationType::parse("nonsense"), None);
    }
}
