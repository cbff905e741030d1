/// Settings queries
///
/// The engine consumes persisted per-user settings through this narrow
/// contract: per-type, per-channel notification preferences and the
/// mention-permission policy. Storage management of settings beyond these
/// queries lives outside the engine.
use crate::{
    error::{SkeinError, SkeinResult},
    identity::MentionPolicy,
    notifications::NotificationType,
};
use sqlx::{Row, SqlitePool};

/// Notification delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    InApp,
    Email,
}

/// Settings store service
pub struct SettingsStore {
    db: SqlitePool,
}

impl SettingsStore {
    /// Create a new settings store
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// May `user_id` receive notifications of `notif_type` on `channel`?
    /// An absent preference row means the channel is enabled.
    pub async fn can_receive_notification(
        &self,
        user_id: &str,
        notif_type: NotificationType,
        channel: Channel,
    ) -> SkeinResult<bool> {
        let row = sqlx::query(
            "SELECT in_app, email FROM notification_preferences
             WHERE user_id = ?1 AND notif_type = ?2",
        )
        .bind(user_id)
        .bind(notif_type.as_str())
        .fetch_optional(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        let Some(row) = row else {
            return Ok(true);
        };

        let allowed: bool = match channel {
            Channel::InApp => row.try_get("in_app")?,
            Channel::Email => row.try_get("email")?,
        };

        Ok(allowed)
    }

    /// Store a per-type preference, replacing any existing row
    pub async fn set_preference(
        &self,
        user_id: &str,
        notif_type: NotificationType,
        in_app: bool,
        email: bool,
    ) -> SkeinResult<()> {
        sqlx::query(
            "INSERT INTO notification_preferences (user_id, notif_type, in_app, email)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, notif_type) DO UPDATE SET in_app = ?3, email = ?4",
        )
        .bind(user_id)
        .bind(notif_type.as_str())
        .bind(in_app)
        .bind(email)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        Ok(())
    }

    /// May `from_id` mention `to_id`? Policy `followers` admits senders the
    /// target follows with accepted status.
    pub async fn can_mention_user(&self, from_id: &str, to_id: &str) -> SkeinResult<bool> {
        let row = sqlx::query("SELECT allow_mentions_from FROM users WHERE id = ?1")
            .bind(to_id)
            .fetch_optional(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        let Some(row) = row else {
            return Ok(false);
        };

        let policy: String = row.try_get("allow_mentions_from")?;
        match MentionPolicy::from(policy.as_str()) {
            MentionPolicy::Everyone => Ok(true),
            MentionPolicy::Nobody => Ok(false),
            MentionPolicy::Followers => {
                let follow = sqlx::query(
                    "SELECT 1 FROM follows
                     WHERE follower_id = ?1 AND following_id = ?2 AND status = 'accepted'",
                )
                .bind(to_id)
                .bind(from_id)
                .fetch_optional(&self.db)
                .await
                .map_err(SkeinError::Database)?;

                Ok(follow.is_some())
            }
        }
    }
}
