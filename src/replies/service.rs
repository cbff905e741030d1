/// Reply mutations: create/update/delete and like/unlike
use crate::{
    error::{SkeinError, SkeinResult},
    notifications::{CreateNotification, NotificationEngine, NotificationType},
    realtime::{Gateway, GatewayEvent},
    replies::models::{row_to_reply, NewReply, Reply},
    threads::service::validate_content,
    visibility::VisibilityResolver,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Reply service
pub struct ReplyService {
    db: SqlitePool,
    visibility: Arc<VisibilityResolver>,
    notifications: Arc<NotificationEngine>,
    gateway: Arc<Gateway>,
}

impl ReplyService {
    /// Create a new reply service
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

    /// Create a reply, top-level or nested. Only direct replies bump the
    /// thread's replies_count.
    pub async fn create_reply(&self, new_reply: NewReply) -> SkeinResult<Reply> {
        validate_content(&new_reply.content, false)?;

        let thread = sqlx::query("SELECT author_id FROM threads WHERE id = ?1")
            .bind(&new_reply.thread_id)
            .fetch_optional(&self.db)
            .await
            .map_err(SkeinError::Database)?;
        let Some(thread) = thread else {
            return Err(SkeinError::NotFound(format!(
                "Thread {} not found",
                new_reply.thread_id
            )));
        };
        let thread_author: String = thread.try_get("author_id")?;

        self.visibility
            .assert_can_view(Some(&new_reply.author_id), &thread_author)
            .await?;

        if let Some(ref parent_id) = new_reply.parent_reply_id {
            let parent = self.get_reply_record(parent_id).await?;
            if parent.thread_id != new_reply.thread_id {
                return Err(SkeinError::Validation(
                    "Parent reply belongs to a different thread".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let reply = Reply {
            id: Uuid::new_v4().to_string(),
            thread_id: new_reply.thread_id,
            author_id: new_reply.author_id,
            parent_reply_id: new_reply.parent_reply_id,
            content: new_reply.content,
            likes_count: 0,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO replies (id, thread_id, author_id, parent_reply_id, content, likes_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
        )
        .bind(&reply.id)
        .bind(&reply.thread_id)
        .bind(&reply.author_id)
        .bind(&reply.parent_reply_id)
        .bind(&reply.content)
        .bind(reply.created_at)
        .bind(reply.updated_at)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        let replies_count = if reply.parent_reply_id.is_none() {
            sqlx::query(
                "UPDATE threads SET replies_count = replies_count + 1 WHERE id = ?1
                 RETURNING replies_count",
            )
            .bind(&reply.thread_id)
            .fetch_one(&self.db)
            .await
            .map_err(SkeinError::Database)?
            .try_get::<i64, _>("replies_count")?
        } else {
            sqlx::query("SELECT replies_count FROM threads WHERE id = ?1")
                .bind(&reply.thread_id)
                .fetch_one(&self.db)
                .await
                .map_err(SkeinError::Database)?
                .try_get::<i64, _>("replies_count")?
        };

        // Side effects: notification to the thread author, mention fan-out,
        // live events for topic subscribers. None of them fail the create.
        if thread_author != reply.author_id {
            if let Err(e) = self
                .notifications
                .create(CreateNotification {
                    notif_type: NotificationType::ThreadReply,
                    recipient_id: thread_author.clone(),
                    sender_id: reply.author_id.clone(),
                    thread_id: Some(reply.thread_id.clone()),
                    reply_id: Some(reply.id.clone()),
                })
                .await
            {
                warn!("Reply notification for thread {} failed: {}", reply.thread_id, e);
            }
        }

        if let Err(e) = self
            .notifications
            .create_mention_notifications(
                &reply.content,
                &reply.author_id,
                Some(&reply.thread_id),
                Some(&reply.id),
            )
            .await
        {
            warn!("Mention processing for reply {} failed: {}", reply.id, e);
        }

        let topic = Gateway::thread_topic(&reply.thread_id);
        self.gateway
            .push_to_topic(
                &topic,
                GatewayEvent::NewReply {
                    thread_id: reply.thread_id.clone(),
                    reply_id: reply.id.clone(),
                    author_id: reply.author_id.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;
        let update = GatewayEvent::ThreadUpdate {
            thread_id: reply.thread_id.clone(),
            fields: json!({ "repliesCount": replies_count }),
            timestamp: Utc::now(),
        };
        self.gateway.push_to_topic(&topic, update.clone()).await;
        self.gateway.push_to_user(&thread_author, update).await;

        Ok(reply)
    }

    /// Update a reply's content. Only the author may edit.
    pub async fn update_reply(
        &self,
        actor_id: &str,
        reply_id: &str,
        content: String,
    ) -> SkeinResult<Reply> {
        let mut reply = self.get_reply_record(reply_id).await?;

        if reply.author_id != actor_id {
            return Err(SkeinError::Authorization(
                "Only the author can edit a reply".to_string(),
            ));
        }

        validate_content(&content, false)?;

        let now = Utc::now();
        sqlx::query("UPDATE replies SET content = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(&content)
            .bind(now)
            .bind(reply_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        reply.content = content;
        reply.updated_at = now;
        Ok(reply)
    }

    /// Delete a reply and its nested descendants. Only the author may
    /// delete; only a top-level delete touches the thread's replies_count.
    pub async fn delete_reply(&self, actor_id: &str, reply_id: &str) -> SkeinResult<()> {
        let reply = self.get_reply_record(reply_id).await?;

        if reply.author_id != actor_id {
            return Err(SkeinError::Authorization(
                "Only the author can delete a reply".to_string(),
            ));
        }

        sqlx::query("DELETE FROM replies WHERE id = ?1")
            .bind(reply_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        if reply.parent_reply_id.is_none() {
            sqlx::query(
                "UPDATE threads SET replies_count = MAX(replies_count - 1, 0) WHERE id = ?1",
            )
            .bind(&reply.thread_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;
        }

        Ok(())
    }

    /// Like a reply
    pub async fn like_reply(&self, actor_id: &str, reply_id: &str) -> SkeinResult<Reply> {
        let reply = self.get_reply_record(reply_id).await?;

        sqlx::query("INSERT INTO reply_likes (user_id, reply_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(actor_id)
            .bind(reply_id)
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .map_err(|e| {
                let err = SkeinError::Database(e);
                if err.is_unique_violation() {
                    SkeinError::Conflict("Reply already liked".to_string())
                } else {
                    err
                }
            })?;

        sqlx::query("UPDATE replies SET likes_count = likes_count + 1 WHERE id = ?1")
            .bind(reply_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        if reply.author_id != actor_id {
            if let Err(e) = self
                .notifications
                .create(CreateNotification {
                    notif_type: NotificationType::ReplyLike,
                    recipient_id: reply.author_id.clone(),
                    sender_id: actor_id.to_string(),
                    thread_id: Some(reply.thread_id.clone()),
                    reply_id: Some(reply_id.to_string()),
                })
                .await
            {
                warn!("Like notification for reply {} failed: {}", reply_id, e);
            }
        }

        self.get_reply_record(reply_id).await
    }

    /// Remove a like from a reply
    pub async fn unlike_reply(&self, actor_id: &str, reply_id: &str) -> SkeinResult<Reply> {
        let result = sqlx::query("DELETE FROM reply_likes WHERE user_id = ?1 AND reply_id = ?2")
            .bind(actor_id)
            .bind(reply_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SkeinError::NotFound("Like not found".to_string()));
        }

        sqlx::query("UPDATE replies SET likes_count = MAX(likes_count - 1, 0) WHERE id = ?1")
            .bind(reply_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        self.get_reply_record(reply_id).await
    }

    /// Fetch a reply row or NotFound
    pub async fn get_reply_record(&self, reply_id: &str) -> SkeinResult<Reply> {
        let row = sqlx::query("SELECT * FROM replies WHERE id = ?1")
            .bind(reply_id)
            .fetch_optional(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        match row {
            Some(row) => row_to_reply(&row),
            None => Err(SkeinError::NotFound(format!(
                "Reply {} not found",
                reply_id
            ))),
        }
    }
}
