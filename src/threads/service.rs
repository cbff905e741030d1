/// Thread mutations: create/update/delete, like/unlike, repost/unrepost
///
/// Primary-entity mutations fail loudly; the notification and realtime
/// side effects they trigger fail silently with logging and never abort
/// the mutation.
use crate::{
    error::{SkeinError, SkeinResult},
    notifications::{CreateNotification, NotificationEngine, NotificationType},
    realtime::{Gateway, GatewayEvent},
    threads::models::{row_to_thread, NewThread, Thread},
    visibility::VisibilityResolver,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Maximum content length in characters
pub const MAX_CONTENT_LEN: usize = 500;

/// Thread service
pub struct ThreadService {
    db: SqlitePool,
    visibility: Arc<VisibilityResolver>,
    notifications: Arc<NotificationEngine>,
    gateway: Arc<Gateway>,
}

impl ThreadService {
    /// Create a new thread service
    pub fn new(
        db: SqlitePool,
        visibility: Arc<VisibilityResolver>,
        notifications: Arc<NotificationEngine>,
        gateway: Arc<Gateway>,
    ) -> Self {
        Self {
            db,
            visibility,
            notifications,
            gateway,
        }
    }

    /// Create a thread
    pub async fn create_thread(&self, new_thread: NewThread) -> SkeinResult<Thread> {
        validate_content(&new_thread.content, new_thread.media.is_some())?;

        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4().to_string(),
            author_id: new_thread.author_id,
            content: new_thread.content,
            media_url: new_thread.media.as_ref().map(|m| m.url.clone()),
            media_kind: new_thread.media.as_ref().map(|m| m.kind),
            likes_count: 0,
            replies_count: 0,
            reposts_count: 0,
            reposted_from: None,
            reposted_from_reply: None,
            created_at: now,
            updated_at: now,
        };

        self.insert_thread(&thread).await?;

        // Mentions are a side effect; a failure never fails the create
        if let Err(e) = self
            .notifications
            .create_mention_notifications(&thread.content, &thread.author_id, Some(&thread.id), None)
            .await
        {
            warn!("Mention processing for thread {} failed: {}", thread.id, e);
        }

        Ok(thread)
    }

    /// Update a thread's content. Only the author may edit.
    pub async fn update_thread(
        &self,
        actor_id: &str,
        thread_id: &str,
        content: String,
    ) -> SkeinResult<Thread> {
        let mut thread = self.get_thread_record(thread_id).await?;

        if thread.author_id != actor_id {
            return Err(SkeinError::Authorization(
                "Only the author can edit a thread".to_string(),
            ));
        }

        validate_content(&content, thread.media_url.is_some())?;

        let now = Utc::now();
        sqlx::query("UPDATE threads SET content = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(&content)
            .bind(now)
            .bind(thread_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        thread.content = content;
        thread.updated_at = now;
        Ok(thread)
    }

    /// Delete a thread. Only the author may delete. Replies and likes go
    /// with it; if the thread was a repost, the source count is restored.
    pub async fn delete_thread(&self, actor_id: &str, thread_id: &str) -> SkeinResult<()> {
        let thread = self.get_thread_record(thread_id).await?;

        if thread.author_id != actor_id {
            return Err(SkeinError::Authorization(
                "Only the author can delete a thread".to_string(),
            ));
        }

        if let Some(ref source_id) = thread.reposted_from {
            self.adjust_reposts_count(source_id, -1).await?;
        }

        sqlx::query("DELETE FROM threads WHERE id = ?1")
            .bind(thread_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        Ok(())
    }

    /// Like a thread. Uniqueness comes from the (user, thread) constraint;
    /// a duplicate surfaces as ConflictError with the count unchanged.
    pub async fn like_thread(&self, actor_id: &str, thread_id: &str) -> SkeinResult<Thread> {
        let thread = self.get_thread_record(thread_id).await?;
        self.visibility
            .assert_can_view(Some(actor_id), &thread.author_id)
            .await?;

        sqlx::query("INSERT INTO likes (user_id, thread_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(actor_id)
            .bind(thread_id)
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .map_err(|e| {
                let err = SkeinError::Database(e);
                if err.is_unique_violation() {
                    SkeinError::Conflict("Thread already liked".to_string())
                } else {
                    err
                }
            })?;

        sqlx::query("UPDATE threads SET likes_count = likes_count + 1 WHERE id = ?1")
            .bind(thread_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        if thread.author_id != actor_id {
            if let Err(e) = self
                .notifications
                .create(CreateNotification {
                    notif_type: NotificationType::ThreadLike,
                    recipient_id: thread.author_id.clone(),
                    sender_id: actor_id.to_string(),
                    thread_id: Some(thread_id.to_string()),
                    reply_id: None,
                })
                .await
            {
                warn!("Like notification for thread {} failed: {}", thread_id, e);
            }
        }

        let updated = self.get_thread_record(thread_id).await?;
        self.gateway
            .push_to_topic(
                &Gateway::thread_topic(thread_id),
                GatewayEvent::NewLike {
                    thread_id: thread_id.to_string(),
                    user_id: actor_id.to_string(),
                    timestamp: Utc::now(),
                },
            )
            .await;
        self.push_thread_update(&updated, json!({ "likesCount": updated.likes_count }))
            .await;

        Ok(updated)
    }

    /// Remove a like
    pub async fn unlike_thread(&self, actor_id: &str, thread_id: &str) -> SkeinResult<Thread> {
        let result = sqlx::query("DELETE FROM likes WHERE user_id = ?1 AND thread_id = ?2")
            .bind(actor_id)
            .bind(thread_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SkeinError::NotFound("Like not found".to_string()));
        }

        sqlx::query(
            "UPDATE threads SET likes_count = MAX(likes_count - 1, 0) WHERE id = ?1",
        )
        .bind(thread_id)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        let updated = self.get_thread_record(thread_id).await?;
        self.push_thread_update(&updated, json!({ "likesCount": updated.likes_count }))
            .await;

        Ok(updated)
    }

    /// Repost a thread. Reposting a repost records the immediate source, so
    /// chains stay one level deep. One repost per (author, source) pair.
    pub async fn repost_thread(&self, actor_id: &str, thread_id: &str) -> SkeinResult<Thread> {
        let target = self.get_thread_record(thread_id).await?;
        self.visibility
            .assert_can_view(Some(actor_id), &target.author_id)
            .await?;

        let source = if target.repost_source_id() == target.id {
            target
        } else {
            self.get_thread_record(target.repost_source_id()).await?
        };

        if source.author_id == actor_id {
            return Err(SkeinError::Conflict(
                "Cannot repost your own thread".to_string(),
            ));
        }

        let now = Utc::now();
        let repost = Thread {
            id: Uuid::new_v4().to_string(),
            author_id: actor_id.to_string(),
            content: source.content.clone(),
            media_url: source.media_url.clone(),
            media_kind: source.media_kind,
            likes_count: 0,
            replies_count: 0,
            reposts_count: 0,
            reposted_from: Some(source.id.clone()),
            reposted_from_reply: None,
            created_at: now,
            updated_at: now,
        };

        self.insert_thread(&repost).await.map_err(|err| {
            if err.is_unique_violation() {
                SkeinError::Conflict("Thread already reposted".to_string())
            } else {
                err
            }
        })?;

        self.adjust_reposts_count(&source.id, 1).await?;

        if let Err(e) = self
            .notifications
            .create(CreateNotification {
                notif_type: NotificationType::ThreadRepost,
                recipient_id: source.author_id.clone(),
                sender_id: actor_id.to_string(),
                thread_id: Some(source.id.clone()),
                reply_id: None,
            })
            .await
        {
            warn!("Repost notification for thread {} failed: {}", source.id, e);
        }

        let updated_source = self.get_thread_record(&source.id).await?;
        self.push_thread_update(
            &updated_source,
            json!({ "repostsCount": updated_source.reposts_count }),
        )
        .await;

        Ok(repost)
    }

    /// Delete the actor's repost of a source thread, restoring its count
    pub async fn unrepost_thread(&self, actor_id: &str, source_id: &str) -> SkeinResult<()> {
        let result = sqlx::query(
            "DELETE FROM threads WHERE author_id = ?1 AND reposted_from = ?2",
        )
        .bind(actor_id)
        .bind(source_id)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SkeinError::NotFound("Repost not found".to_string()));
        }

        self.adjust_reposts_count(source_id, -1).await?;

        if let Ok(updated) = self.get_thread_record(source_id).await {
            self.push_thread_update(&updated, json!({ "repostsCount": updated.reposts_count }))
                .await;
        }

        Ok(())
    }

    /// Fetch a thread row or NotFound
    pub async fn get_thread_record(&self, thread_id: &str) -> SkeinResult<Thread> {
        let row = sqlx::query("SELECT * FROM threads WHERE id = ?1")
            .bind(thread_id)
            .fetch_optional(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        match row {
            Some(row) => row_to_thread(&row),
            None => Err(SkeinError::NotFound(format!(
                "Thread {} not found",
                thread_id
            ))),
        }
    }

    async fn insert_thread(&self, thread: &Thread) -> SkeinResult<()> {
        sqlx::query(
            "INSERT INTO threads (id, author_id, content, media_url, media_kind, likes_count, replies_count, reposts_count, reposted_from, reposted_from_reply, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&thread.id)
        .bind(&thread.author_id)
        .bind(&thread.content)
        .bind(&thread.media_url)
        .bind(thread.media_kind.map(|k| k.as_str()))
        .bind(thread.likes_count)
        .bind(thread.replies_count)
        .bind(thread.reposts_count)
        .bind(&thread.reposted_from)
        .bind(&thread.reposted_from_reply)
        .bind(thread.created_at)
        .bind(thread.updated_at)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        Ok(())
    }

    async fn adjust_reposts_count(&self, thread_id: &str, delta: i64) -> SkeinResult<()> {
        sqlx::query(
            "UPDATE threads SET reposts_count = MAX(reposts_count + ?1, 0) WHERE id = ?2",
        )
        .bind(delta)
        .bind(thread_id)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        Ok(())
    }

    /// Live counter refresh, delivered to the thread's topic group and to
    /// the author's personal group
    async fn push_thread_update(&self, thread: &Thread, fields: serde_json::Value) {
        let event = GatewayEvent::ThreadUpdate {
            thread_id: thread.id.clone(),
            fields,
            timestamp: Utc::now(),
        };
        self.gateway
            .push_to_topic(&Gateway::thread_topic(&thread.id), event.clone())
            .await;
        self.gateway.push_to_user(&thread.author_id, event).await;
    }
}

/// Validate thread/reply content bounds
pub(crate) fn validate_content(content: &str, has_media: bool) -> SkeinResult<()> {
    if content.trim().is_empty() && !has_media {
        return Err(SkeinError::Validation("Content is required".to_string()));
    }

    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(SkeinError::Validation(format!(
            "Content exceeds {} characters",
            MAX_CONTENT_LEN
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_requires_media() {
        assert!(validate_content("", false).is_err());
        assert!(validate_content("   ", false).is_err());
        assert!(validate_content("", true).is_ok());
    }

    #[test]
    fn content_length_is_bounded_in_chars() {
        let ok = "x".repeat(MAX_CONTENT_LEN);
        assert!(validate_content(&ok, false).is_ok());

        let too_long = "x".repeat(MAX_CONTENT_LEN + 1);
        assert!(validate_content(&too_long, false).is_err());

        // Multibyte characters count as one
        let emoji = "🧵".repeat(MAX_CONTENT_LEN);
        assert!(validate_content(&emoji, false).is_ok());
    }
}
