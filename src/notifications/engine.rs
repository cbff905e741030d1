/// Notification creation, read-state transitions and delivery hand-off
use crate::{
    error::{SkeinError, SkeinResult},
    feed::Pagination,
    identity::{UserStore, UserView},
    mailer::Mailer,
    notifications::{row_to_notification, Notification, NotificationType, NotificationView},
    realtime::{Gateway, GatewayEvent},
    settings::{Channel, SettingsStore},
};
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Structurally identical notifications created within this window collapse
/// into one stored record. Race-tolerant heuristic, not a guarantee.
const DEDUP_WINDOW_SECS: i64 = 60;

/// Parameters for creating a notification
#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub notif_type: NotificationType,
    pub recipient_id: String,
    pub sender_id: String,
    pub thread_id: Option<String>,
    pub reply_id: Option<String>,
}

/// One page of notifications
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    pub items: Vec<NotificationView>,
    pub pagination: Pagination,
}

/// Notification engine service
pub struct NotificationEngine {
    db: SqlitePool,
    settings: Arc<SettingsStore>,
    users: Arc<UserStore>,
    gateway: Arc<Gateway>,
    mailer: Arc<Mailer>,
}

impl NotificationEngine {
    /// Create a new notification engine
    pub fn new(
        db: SqlitePool,
        settings: Arc<SettingsStore>,
        users: Arc<UserStore>,
        gateway: Arc<Gateway>,
        mailer: Arc<Mailer>,
    ) -> Self {
        Self {
            db,
            settings,
            users,
            gateway,
            mailer,
        }
    }

    pub(crate) fn users(&self) -> &Arc<UserStore> {
        &self.users
    }

    pub(crate) fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Create a notification.
    ///
    /// Returns `None` when the recipient has disabled the in-app channel for
    /// this type, and the existing record when an identical notification was
    /// created inside the dedup window. Delivery steps (push, email) are
    /// best-effort: their failures are logged and never abort the remaining
    /// steps or the caller's mutation.
    pub async fn create(&self, input: CreateNotification) -> SkeinResult<Option<Notification>> {
        if input.recipient_id.is_empty() || input.sender_id.is_empty() {
            return Err(SkeinError::Validation(
                "Notification requires recipient and sender".to_string(),
            ));
        }

        // Preference gate. A settings failure must not suppress the
        // notification, so only an explicit opt-out short-circuits.
        match self
            .settings
            .can_receive_notification(&input.recipient_id, input.notif_type, Channel::InApp)
            .await
        {
            Ok(false) => return Ok(None),
            Ok(true) => {}
            Err(e) => warn!("Notification preference lookup failed: {}", e),
        }

        // Dedup against recent identical notifications
        match self.find_recent_duplicate(&input).await {
            Ok(Some(existing)) => return Ok(Some(existing)),
            Ok(None) => {}
            Err(e) => warn!("Notification dedup lookup failed: {}", e),
        }

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            notif_type: input.notif_type,
            recipient_id: input.recipient_id,
            sender_id: input.sender_id,
            thread_id: input.thread_id,
            reply_id: input.reply_id,
            read: false,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO notifications (id, notif_type, recipient_id, sender_id, thread_id, reply_id, read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&notification.id)
        .bind(notification.notif_type.as_str())
        .bind(&notification.recipient_id)
        .bind(&notification.sender_id)
        .bind(&notification.thread_id)
        .bind(&notification.reply_id)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        // Realtime push, best-effort
        match self.build_view(&notification).await {
            Ok(view) => {
                self.gateway
                    .push_to_user(
                        &notification.recipient_id,
                        GatewayEvent::NewNotification {
                            data: view,
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
            }
            Err(e) => warn!("Failed to build notification push payload: {}", e),
        }
        self.push_unread_count(&notification.recipient_id).await;

        // Email delivery, preference-gated and fully detached from the caller
        match self
            .settings
            .can_receive_notification(
                &notification.recipient_id,
                notification.notif_type,
                Channel::Email,
            )
            .await
        {
            Ok(true) => self.dispatch_email(&notification).await,
            Ok(false) => {}
            Err(e) => warn!("Email preference lookup failed: {}", e),
        }

        Ok(Some(notification))
    }

    /// Look for an identical notification inside the dedup window
    async fn find_recent_duplicate(
        &self,
        input: &CreateNotification,
    ) -> SkeinResult<Option<Notification>> {
        let cutoff = Utc::now() - Duration::seconds(DEDUP_WINDOW_SECS);

        let row = sqlx::query(
            "SELECT * FROM notifications
             WHERE recipient_id = ?1 AND sender_id = ?2 AND notif_type = ?3
               AND thread_id IS ?4 AND reply_id IS ?5
               AND created_at > ?6
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&input.recipient_id)
        .bind(&input.sender_id)
        .bind(input.notif_type.as_str())
        .bind(&input.thread_id)
        .bind(&input.reply_id)
        .bind(cutoff)
        .fetch_optional(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        row.map(|r| row_to_notification(&r)).transpose()
    }

    /// Resolve the sender into a pushable view
    async fn build_view(&self, notification: &Notification) -> SkeinResult<NotificationView> {
        let sender = self.users.get_user(&notification.sender_id).await?;

        Ok(NotificationView {
            id: notification.id.clone(),
            notif_type: notification.notif_type,
            sender: UserView::from(&sender),
            thread_id: notification.thread_id.clone(),
            reply_id: notification.reply_id.clone(),
            read: notification.read,
            created_at: notification.created_at,
        })
    }

    /// Push the recipient's current unread count, best-effort
    pub async fn push_unread_count(&self, user_id: &str) {
        match self.unread_count(user_id).await {
            Ok(count) => {
                self.gateway
                    .push_to_user(
                        user_id,
                        GatewayEvent::UnreadCount {
                            count,
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
            }
            Err(e) => warn!("Failed to compute unread count for {}: {}", user_id, e),
        }
    }

    /// Resolve names and dispatch the templated email off the request path
    async fn dispatch_email(&self, notification: &Notification) {
        let recipient = match self.users.get_user(&notification.recipient_id).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Email dispatch: recipient lookup failed: {}", e);
                return;
            }
        };
        let Some(to_email) = recipient.email.clone() else {
            return;
        };
        let sender = match self.users.get_user(&notification.sender_id).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Email dispatch: sender lookup failed: {}", e);
                return;
            }
        };

        let (subject, summary) = email_content(notification.notif_type, &sender.display_name);
        let mailer = Arc::clone(&self.mailer);
        let display_name = recipient.display_name.clone();

        tokio::spawn(async move {
            if let Err(e) = mailer
                .send_notification_email(&to_email, &display_name, &subject, &summary)
                .await
            {
                warn!("Notification email delivery failed: {}", e);
            }
        });
    }

    /// List a user's notifications, newest first
    pub async fn list(
        &self,
        user_id: &str,
        page: i64,
        page_size: i64,
    ) -> SkeinResult<NotificationPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);

        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM notifications WHERE recipient_id = ?1")
                .bind(user_id)
                .fetch_one(&self.db)
                .await
                .map_err(SkeinError::Database)?
                .try_get("total")?;

        let rows = sqlx::query(
            "SELECT * FROM notifications
             WHERE recipient_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2 OFFSET ?3",
        )
        .bind(user_id)
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        let notifications: Vec<Notification> = rows
            .iter()
            .map(row_to_notification)
            .collect::<SkeinResult<_>>()?;

        let sender_ids: Vec<String> = {
            let mut ids: Vec<String> =
                notifications.iter().map(|n| n.sender_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let senders = self.users.get_users(&sender_ids).await?;

        let mut items = Vec::with_capacity(notifications.len());
        for n in &notifications {
            let Some(sender) = senders.get(&n.sender_id) else {
                continue; // sender account deleted between queries
            };
            items.push(NotificationView {
                id: n.id.clone(),
                notif_type: n.notif_type,
                sender: UserView::from(sender),
                thread_id: n.thread_id.clone(),
                reply_id: n.reply_id.clone(),
                read: n.read,
                created_at: n.created_at,
            });
        }

        Ok(NotificationPage {
            items,
            pagination: Pagination::new(page, page_size, total),
        })
    }

    /// Count of unread notifications
    pub async fn unread_count(&self, user_id: &str) -> SkeinResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM notifications WHERE recipient_id = ?1 AND read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        Ok(row.try_get("total")?)
    }

    /// Mark a single notification as read
    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> SkeinResult<()> {
        let result = sqlx::query(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SkeinError::NotFound("Notification not found".to_string()));
        }

        self.push_unread_count(user_id).await;
        Ok(())
    }

    /// Mark all of a user's notifications as read, returning the number of
    /// records changed
    pub async fn mark_all_read(&self, user_id: &str) -> SkeinResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = 1 WHERE recipient_id = ?1 AND read = 0",
        )
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        self.push_unread_count(user_id).await;
        Ok(result.rows_affected())
    }

    /// Delete a single notification
    pub async fn delete(&self, user_id: &str, notification_id: &str) -> SkeinResult<()> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2")
                .bind(notification_id)
                .bind(user_id)
                .execute(&self.db)
                .await
                .map_err(SkeinError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SkeinError::NotFound("Notification not found".to_string()));
        }

        Ok(())
    }

    /// Delete all of a user's notifications, returning the number removed
    pub async fn delete_all(&self, user_id: &str) -> SkeinResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE recipient_id = ?1")
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        Ok(result.rows_affected())
    }
}

/// Subject line and one-line summary for the notification email template
fn email_content(notif_type: NotificationType, sender_name: &str) -> (String, String) {
    match notif_type {
        NotificationType::NewFollower => (
            format!("{} followed you", sender_name),
            format!("{} is now following you.", sender_name),
        ),
        NotificationType::FollowRequest => (
            format!("{} wants to follow you", sender_name),
            format!("{} sent you a follow request.", sender_name),
        ),
        NotificationType::FollowAccepted => (
            format!("{} accepted your follow request", sender_name),
            format!("{} accepted your follow request.", sender_name),
        ),
        NotificationType::ThreadLike => (
            format!("{} liked your thread", sender_name),
            format!("{} liked one of your threads.", sender_name),
        ),
        NotificationType::ReplyLike => (
            format!("{} liked your reply", sender_name),
            format!("{} liked one of your replies.", sender_name),
        ),
        NotificationType::ThreadReply => (
            format!("{} replied to your thread", sender_name),
            format!("{} left a reply on your thread.", sender_name),
        ),
        NotificationType::ThreadRepost => (
            format!("{} reposted you", sender_name),
            format!("{} reposted your content.", sender_name),
        ),
        NotificationType::Mention => (
            format!("{} mentioned you", sender_name),
            format!("{} mentioned you in a thread.", sender_name),
        ),
        NotificationType::ContentValidated => (
            "Your content was approved".to_string(),
            "Your content passed review and is visible again.".to_string(),
        ),
        NotificationType::ContentFlagged => (
            "Your content was flagged".to_string(),
            "Your content was flagged for review.".to_string(),
        ),
    }
}
