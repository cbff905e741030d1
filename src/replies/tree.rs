/// Reply tree assembly and subtree replication
///
/// Trees are built from a single adjacency fetch with an explicit worklist
/// instead of native recursion: depth is bounded by a circuit breaker and a
/// corrupted parent graph fails closed with an integrity error instead of
/// looping.
use crate::{
    error::{SkeinError, SkeinResult},
    identity::{UserStore, UserView},
    notifications::{CreateNotification, NotificationEngine, NotificationType},
    replies::models::{row_to_reply, Reply},
    threads::models::Thread,
    threads::service::validate_content,
    visibility::VisibilityResolver,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Circuit breaker for the worklist: a legitimate discussion never nests
/// this deep, so exceeding it means a corrupted parent chain.
const MAX_REPLY_DEPTH: usize = 64;

/// A reply with its assembled children
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyNode {
    pub id: String,
    pub author: UserView,
    pub content: String,
    pub likes_count: i64,
    /// Count of immediate children only
    pub replies_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub children: Vec<ReplyNode>,
}

/// Reply tree builder service
pub struct ReplyTreeBuilder {
    db: SqlitePool,
    users: Arc<UserStore>,
    visibility: Arc<VisibilityResolver>,
    notifications: Arc<NotificationEngine>,
}

impl ReplyTreeBuilder {
    /// Create a new tree builder
    pub fn new(
        db: SqlitePool,
        users: Arc<UserStore>,
        visibility: Arc<VisibilityResolver>,
        notifications: Arc<NotificationEngine>,
    ) -> Self {
        Self {
            db,
            users,
            visibility,
            notifications,
        }
    }

    /// Assemble the full reply tree of a thread: top-level replies newest
    /// first, children at every depth oldest first.
    pub async fn get_tree(&self, thread_id: &str) -> SkeinResult<Vec<ReplyNode>> {
        let exists = sqlx::query("SELECT 1 FROM threads WHERE id = ?1")
            .bind(thread_id)
            .fetch_optional(&self.db)
            .await
            .map_err(SkeinError::Database)?;
        if exists.is_none() {
            return Err(SkeinError::NotFound(format!(
                "Thread {} not found",
                thread_id
            )));
        }

        let rows = sqlx::query("SELECT * FROM replies WHERE thread_id = ?1")
            .bind(thread_id)
            .fetch_all(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        let replies: Vec<Reply> = rows.iter().map(row_to_reply).collect::<SkeinResult<_>>()?;

        let author_ids: Vec<String> = {
            let mut ids: Vec<String> = replies.iter().map(|r| r.author_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let authors = self.users.get_users(&author_ids).await?;

        let levels = level_order(&replies)?;

        // Assemble bottom-up: each level's nodes adopt the already-built
        // subtrees of the level below.
        let mut pending: HashMap<String, Vec<ReplyNode>> = HashMap::new();
        let mut roots: Vec<ReplyNode> = Vec::new();

        for level in levels.iter().rev() {
            for &idx in level {
                let reply = &replies[idx];
                let Some(author) = authors.get(&reply.author_id) else {
                    continue; // author deleted between queries
                };

                let mut children = pending.remove(&reply.id).unwrap_or_default();
                children.sort_by(|a, b| a.created_at.cmp(&b.created_at));

                let node = ReplyNode {
                    id: reply.id.clone(),
                    author: UserView::from(author),
                    content: reply.content.clone(),
                    likes_count: reply.likes_count,
                    replies_count: children.len() as i64,
                    created_at: reply.created_at,
                    updated_at: reply.updated_at,
                    children,
                };

                match &reply.parent_reply_id {
                    Some(parent) => pending.entry(parent.clone()).or_default().push(node),
                    None => roots.push(node),
                }
            }
        }

        roots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(roots)
    }

    /// Repost a reply as a new thread quoting its author, then replicate
    /// the reply's entire descendant subtree under the new thread.
    ///
    /// Copied nodes keep their original authors and relative structure but
    /// are re-rooted: direct children of the reposted reply become top-level
    /// replies of the new thread, deeper nodes point at their copied
    /// parents. The new thread's replies_count covers the first level only.
    pub async fn repost_reply_as_thread(
        &self,
        actor_id: &str,
        reply_id: &str,
    ) -> SkeinResult<Thread> {
        let reply = self.get_reply_record(reply_id).await?;

        let thread_author: String =
            sqlx::query("SELECT author_id FROM threads WHERE id = ?1")
                .bind(&reply.thread_id)
                .fetch_one(&self.db)
                .await
                .map_err(SkeinError::Database)?
                .try_get("author_id")?;
        self.visibility
            .assert_can_view(Some(actor_id), &thread_author)
            .await?;

        if reply.author_id == actor_id {
            return Err(SkeinError::Conflict(
                "Cannot repost your own reply".to_string(),
            ));
        }

        let quoted_author = self.users.get_user(&reply.author_id).await?;
        let content: String = format!("@{} {}", quoted_author.username, reply.content)
            .chars()
            .take(crate::threads::service::MAX_CONTENT_LEN)
            .collect();
        validate_content(&content, false)?;

        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4().to_string(),
            author_id: actor_id.to_string(),
            content,
            media_url: None,
            media_kind: None,
            likes_count: 0,
            replies_count: 0,
            reposts_count: 0,
            reposted_from: None,
            reposted_from_reply: Some(reply.id.clone()),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO threads (id, author_id, content, media_url, media_kind, likes_count, replies_count, reposts_count, reposted_from, reposted_from_reply, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, NULL, 0, 0, 0, NULL, ?4, ?5, ?6)",
        )
        .bind(&thread.id)
        .bind(&thread.author_id)
        .bind(&thread.content)
        .bind(&thread.reposted_from_reply)
        .bind(thread.created_at)
        .bind(thread.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| {
            let err = SkeinError::Database(e);
            if err.is_unique_violation() {
                SkeinError::Conflict("Reply already reposted".to_string())
            } else {
                err
            }
        })?;

        let first_level = self.replicate_subtree(&reply, &thread.id).await?;

        sqlx::query("UPDATE threads SET replies_count = ?1 WHERE id = ?2")
            .bind(first_level)
            .bind(&thread.id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        if let Err(e) = self
            .notifications
            .create(CreateNotification {
                notif_type: NotificationType::ThreadRepost,
                recipient_id: reply.author_id.clone(),
                sender_id: actor_id.to_string(),
                thread_id: Some(thread.id.clone()),
                reply_id: Some(reply.id.clone()),
            })
            .await
        {
            warn!("Repost notification for reply {} failed: {}", reply.id, e);
        }

        Ok(Thread {
            replies_count: first_level,
            ..thread
        })
    }

    /// Copy every descendant of `root` under `new_thread_id`, level by
    /// level so parents always exist before their children. Returns the
    /// number of first-level copies.
    async fn replicate_subtree(&self, root: &Reply, new_thread_id: &str) -> SkeinResult<i64> {
        let rows = sqlx::query("SELECT * FROM replies WHERE thread_id = ?1")
            .bind(&root.thread_id)
            .fetch_all(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        let replies: Vec<Reply> = rows.iter().map(row_to_reply).collect::<SkeinResult<_>>()?;

        let mut children_of: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, reply) in replies.iter().enumerate() {
            if let Some(parent) = reply.parent_reply_id.as_deref() {
                children_of.entry(parent).or_default().push(idx);
            }
        }

        // Worklist walk of the descendant subtree, guarded like get_tree
        let mut visited: HashSet<usize> = HashSet::new();
        let mut levels: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = children_of.get(root.id.as_str()).cloned().unwrap_or_default();

        while !current.is_empty() {
            if levels.len() >= MAX_REPLY_DEPTH {
                return Err(SkeinError::Integrity(
                    "Reply subtree exceeds maximum depth".to_string(),
                ));
            }

            let mut next = Vec::new();
            for &idx in &current {
                if !visited.insert(idx) {
                    return Err(SkeinError::Integrity(
                        "Reply subtree contains a cycle".to_string(),
                    ));
                }
                if let Some(children) = children_of.get(replies[idx].id.as_str()) {
                    next.extend_from_slice(children);
                }
            }

            levels.push(current);
            current = next;
        }

        // Copy top-down, mapping each original parent to its new counterpart
        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut first_level = 0i64;

        for level in &levels {
            for &idx in level {
                let original = &replies[idx];
                let new_id = Uuid::new_v4().to_string();

                let new_parent = match original.parent_reply_id.as_deref() {
                    Some(parent) if parent == root.id => {
                        first_level += 1;
                        None
                    }
                    Some(parent) => id_map.get(parent).cloned(),
                    None => None,
                };

                sqlx::query(
                    "INSERT INTO replies (id, thread_id, author_id, parent_reply_id, content, likes_count, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                )
                .bind(&new_id)
                .bind(new_thread_id)
                .bind(&original.author_id)
                .bind(&new_parent)
                .bind(&original.content)
                .bind(original.created_at)
                .bind(original.updated_at)
                .execute(&self.db)
                .await
                .map_err(SkeinError::Database)?;

                id_map.insert(original.id.clone(), new_id);
            }
        }

        Ok(first_level)
    }

    async fn get_reply_record(&self, reply_id: &str) -> SkeinResult<Reply> {
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

/// Level-order traversal of a thread's reply forest.
///
/// Fails closed when the depth breaker trips or when nodes are unreachable
/// from the top level, which is what a cyclic parent chain looks like from
/// the roots.
fn level_order(replies: &[Reply]) -> SkeinResult<Vec<Vec<usize>>> {
    let mut children_of: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();

    for (idx, reply) in replies.iter().enumerate() {
        match reply.parent_reply_id.as_deref() {
            Some(parent) => children_of.entry(parent).or_default().push(idx),
            None => roots.push(idx),
        }
    }

    let mut visited: HashSet<usize> = HashSet::new();
    let mut levels: Vec<Vec<usize>> = Vec::new();
    let mut current = roots;

    while !current.is_empty() {
        if levels.len() >= MAX_REPLY_DEPTH {
            return Err(SkeinError::Integrity(
                "Reply tree exceeds maximum depth".to_string(),
            ));
        }

        let mut next = Vec::new();
        for &idx in &current {
            if !visited.insert(idx) {
                return Err(SkeinError::Integrity(
                    "Reply tree contains a cycle".to_string(),
                ));
            }
            if let Some(children) = children_of.get(replies[idx].id.as_str()) {
                next.extend_from_slice(children);
            }
        }

        levels.push(current);
        current = next;
    }

    if visited.len() != replies.len() {
        return Err(SkeinError::Integrity(
            "Reply tree contains unreachable nodes".to_string(),
        ));
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(id: &str, parent: Option<&str>) -> Reply {
        Reply {
            id: id.to_string(),
            thread_id: "t1".to_string(),
            author_id: "u1".to_string(),
            parent_reply_id: parent.map(str::to_string),
            content: "hi".to_string(),
            likes_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn level_order_groups_by_depth() {
        let replies = vec![
            reply("a", None),
            reply("b", Some("a")),
            reply("c", Some("a")),
            reply("d", Some("b")),
        ];
        let levels = level_order(&replies).unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec![0]);
        assert_eq!(levels[1], vec![1, 2]);
        assert_eq!(levels[2], vec![3]);
    }

    #[test]
    fn cyclic_parents_fail_closed() {
        let replies = vec![reply("a", Some("b")), reply("b", Some("a"))];
        assert!(matches!(
            level_order(&replies),
            Err(SkeinError::Integrity(_))
        ));
    }

    #[test]
    fn empty_forest_is_empty() {
        assert!(level_order(&[]).unwrap().is_empty());
    }
}
