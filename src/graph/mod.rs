/// Follow graph
///
/// Owns the (follower, following) relation and its pending/accepted state.
/// Follow state drives both the visibility resolver and the per-viewer
/// `is_following`/`follow_status` annotations on feed pages.
use crate::{
    error::{SkeinError, SkeinResult},
    identity::{sql_placeholders, UserStore},
    notifications::{CreateNotification, NotificationEngine, NotificationType},
};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// State of a follow relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowStatus {
    Pending,
    Accepted,
}

impl FollowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowStatus::Pending => "pending",
            FollowStatus::Accepted => "accepted",
        }
    }
}

impl From<&str> for FollowStatus {
    fn from(s: &str) -> Self {
        match s {
            "pending" => FollowStatus::Pending,
            _ => FollowStatus::Accepted,
        }
    }
}

/// Follow graph service
pub struct FollowStore {
    db: SqlitePool,
    users: Arc<UserStore>,
    notifications: Arc<NotificationEngine>,
}

impl FollowStore {
    /// Create a new follow store
    pub fn new(
        db: SqlitePool,
        users: Arc<UserStore>,
        notifications: Arc<NotificationEngine>,
    ) -> Self {
        Self {
            db,
            users,
            notifications,
        }
    }

    /// Follow a user. A follow of a private account starts pending; a follow
    /// of a public account is accepted immediately.
    pub async fn follow(&self, follower_id: &str, target_id: &str) -> SkeinResult<FollowStatus> {
        if follower_id == target_id {
            return Err(SkeinError::Validation(
                "Cannot follow yourself".to_string(),
            ));
        }

        let target = self.users.get_user(target_id).await?;
        let status = if target.is_private {
            FollowStatus::Pending
        } else {
            FollowStatus::Accepted
        };

        sqlx::query(
            "INSERT INTO follows (follower_id, following_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(follower_id)
        .bind(target_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.db)
        .await
        .map_err(|e| {
            let err = SkeinError::Database(e);
            if err.is_unique_violation() {
                SkeinError::Conflict("Already following this user".to_string())
            } else {
                err
            }
        })?;

        // The follow is already committed; a notification failure is logged,
        // not surfaced
        let notif_type = match status {
            FollowStatus::Pending => NotificationType::FollowRequest,
            FollowStatus::Accepted => NotificationType::NewFollower,
        };
        if let Err(e) = self
            .notifications
            .create(CreateNotification {
                notif_type,
                recipient_id: target_id.to_string(),
                sender_id: follower_id.to_string(),
                thread_id: None,
                reply_id: None,
            })
            .await
        {
            warn!("Follow notification for {} failed: {}", target_id, e);
        }

        Ok(status)
    }

    /// Accept a pending follow request
    pub async fn accept(&self, target_id: &str, follower_id: &str) -> SkeinResult<()> {
        let result = sqlx::query(
            "UPDATE follows SET status = 'accepted'
             WHERE follower_id = ?1 AND following_id = ?2 AND status = 'pending'",
        )
        .bind(follower_id)
        .bind(target_id)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SkeinError::NotFound(
                "No pending follow request".to_string(),
            ));
        }

        if let Err(e) = self
            .notifications
            .create(CreateNotification {
                notif_type: NotificationType::FollowAccepted,
                recipient_id: follower_id.to_string(),
                sender_id: target_id.to_string(),
                thread_id: None,
                reply_id: None,
            })
            .await
        {
            warn!("Follow-accepted notification for {} failed: {}", follower_id, e);
        }

        Ok(())
    }

    /// Remove a follow relationship (pending or accepted)
    pub async fn unfollow(&self, follower_id: &str, target_id: &str) -> SkeinResult<()> {
        let result =
            sqlx::query("DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2")
                .bind(follower_id)
                .bind(target_id)
                .execute(&self.db)
                .await
                .map_err(SkeinError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SkeinError::NotFound("Not following this user".to_string()));
        }

        Ok(())
    }

    /// Ids of users the given user follows with accepted status
    pub async fn accepted_following_ids(&self, user_id: &str) -> SkeinResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT following_id FROM follows WHERE follower_id = ?1 AND status = 'accepted'",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("following_id").map_err(SkeinError::Database))
            .collect()
    }

    /// Page-scoped follow-status lookup: viewer → each listed author
    pub async fn status_map(
        &self,
        viewer_id: &str,
        author_ids: &[String],
    ) -> SkeinResult<HashMap<String, FollowStatus>> {
        if author_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query_str = format!(
            "SELECT following_id, status FROM follows
             WHERE follower_id = ? AND following_id IN ({})",
            sql_placeholders(author_ids.len())
        );

        let mut query = sqlx::query(&query_str).bind(viewer_id);
        for id in author_ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.db).await.map_err(SkeinError::Database)?;

        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("following_id")?;
            let status: String = row.try_get("status")?;
            map.insert(id, FollowStatus::from(status.as_str()));
        }

        Ok(map)
    }
}
