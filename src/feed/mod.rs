/// Feed composer
///
/// Builds paginated, viewer-annotated thread listings: the global explore
/// feed, the followed feed, per-author feeds and substring search. Reposts
/// are resolved exactly one level; per-viewer state (liked, reposted,
/// following) is attached from request-scoped lookup maps built once per
/// page instead of per-item existence checks.
use crate::{
    error::{SkeinError, SkeinResult},
    graph::{FollowStatus, FollowStore},
    identity::{sql_placeholders, User, UserStore, UserView},
    threads::models::{row_to_thread, MediaKind, Thread},
    visibility::VisibilityResolver,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Offset pagination summary attached to every listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(page: i64, page_size: i64, total_items: i64) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + page_size - 1) / page_size
        };

        Self {
            current_page: page,
            total_pages,
            total_items,
            has_more: page < total_pages,
        }
    }
}

/// The one-level-resolved original behind a repost
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepostSource {
    pub id: String,
    pub author: UserView,
    pub content: String,
    pub media_url: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub likes_count: i64,
    pub replies_count: i64,
    pub reposts_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_liked: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// Quoted reply context on a repost-of-a-reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepostedReply {
    pub id: String,
    pub author: UserView,
    pub content: String,
}

/// A thread as presented in listings, annotated for the viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    pub id: String,
    pub author: UserView,
    pub content: String,
    pub media_url: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub likes_count: i64,
    pub replies_count: i64,
    pub reposts_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reposted_from: Option<Box<RepostSource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reposted_from_reply: Option<RepostedReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_liked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_reposted: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of threads
#[derive(Debug, Clone, Serialize)]
pub struct ThreadPage {
    pub items: Vec<ThreadView>,
    pub pagination: Pagination,
}

/// Request-scoped per-viewer lookup maps, built once per page and handed
/// to the enrichment step.
#[derive(Debug, Default)]
struct ViewerMaps {
    liked: HashSet<String>,
    repost_sources: HashSet<String>,
    reply_repost_sources: HashSet<String>,
    follow_status: HashMap<String, FollowStatus>,
}

/// Feed composer service
pub struct FeedComposer {
    db: SqlitePool,
    users: Arc<UserStore>,
    follows: Arc<FollowStore>,
    visibility: Arc<VisibilityResolver>,
}

impl FeedComposer {
    /// Create a new feed composer
    pub fn new(
        db: SqlitePool,
        users: Arc<UserStore>,
        follows: Arc<FollowStore>,
        visibility: Arc<VisibilityResolver>,
    ) -> Self {
        Self {
            db,
            users,
            follows,
            visibility,
        }
    }

    /// Global explore feed: everything the viewer is allowed to see,
    /// newest first
    pub async fn list_explore(
        &self,
        page: i64,
        page_size: i64,
        viewer_id: Option<&str>,
    ) -> SkeinResult<ThreadPage> {
        let (page, page_size) = clamp_page(page, page_size);
        let hidden = self.visibility.hidden_author_ids(viewer_id).await?;

        let filter = if hidden.is_empty() {
            String::new()
        } else {
            format!(
                "WHERE author_id NOT IN ({})",
                sql_placeholders(hidden.len())
            )
        };

        let count_str = format!("SELECT COUNT(*) AS total FROM threads {}", filter);
        let mut count_query = sqlx::query(&count_str);
        for id in &hidden {
            count_query = count_query.bind(id);
        }
        let total: i64 = count_query
            .fetch_one(&self.db)
            .await
            .map_err(SkeinError::Database)?
            .try_get("total")?;

        let select_str = format!(
            "SELECT * FROM threads {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            filter
        );
        let mut select_query = sqlx::query(&select_str);
        for id in &hidden {
            select_query = select_query.bind(id);
        }
        let rows = select_query
            .bind(page_size)
            .bind((page - 1) * page_size)
            .fetch_all(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        let threads: Vec<Thread> = rows.iter().map(row_to_thread).collect::<SkeinResult<_>>()?;
        let items = self.enrich_page(threads, viewer_id).await?;

        Ok(ThreadPage {
            items,
            pagination: Pagination::new(page, page_size, total),
        })
    }

    /// Followed feed: threads from accepted-followed authors, the viewer's
    /// own threads, and all public authors. Degrades to the explore feed
    /// when no viewer is present.
    pub async fn list_followed(
        &self,
        page: i64,
        page_size: i64,
        viewer_id: Option<&str>,
    ) -> SkeinResult<ThreadPage> {
        let Some(viewer) = viewer_id else {
            return self.list_explore(page, page_size, None).await;
        };

        let (page, page_size) = clamp_page(page, page_size);

        let mut included = self.follows.accepted_following_ids(viewer).await?;
        included.push(viewer.to_string());

        let in_list = sql_placeholders(included.len());
        let filter = format!(
            "FROM threads t JOIN users u ON u.id = t.author_id
             WHERE u.is_private = 0 OR t.author_id IN ({})",
            in_list
        );

        let count_str = format!("SELECT COUNT(*) AS total {}", filter);
        let mut count_query = sqlx::query(&count_str);
        for id in &included {
            count_query = count_query.bind(id);
        }
        let total: i64 = count_query
            .fetch_one(&self.db)
            .await
            .map_err(SkeinError::Database)?
            .try_get("total")?;

        let select_str = format!(
            "SELECT t.* {} ORDER BY t.created_at DESC LIMIT ? OFFSET ?",
            filter
        );
        let mut select_query = sqlx::query(&select_str);
        for id in &included {
            select_query = select_query.bind(id);
        }
        let rows = select_query
            .bind(page_size)
            .bind((page - 1) * page_size)
            .fetch_all(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        let threads: Vec<Thread> = rows.iter().map(row_to_thread).collect::<SkeinResult<_>>()?;
        let items = self.enrich_page(threads, viewer_id).await?;

        Ok(ThreadPage {
            items,
            pagination: Pagination::new(page, page_size, total),
        })
    }

    /// Threads of a single author, privacy-gated for the viewer
    pub async fn list_by_author(
        &self,
        author_id: &str,
        page: i64,
        page_size: i64,
        viewer_id: Option<&str>,
    ) -> SkeinResult<ThreadPage> {
        let (page, page_size) = clamp_page(page, page_size);
        self.visibility.assert_can_view(viewer_id, author_id).await?;

        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS total FROM threads WHERE author_id = ?1")
                .bind(author_id)
                .fetch_one(&self.db)
                .await
                .map_err(SkeinError::Database)?
                .try_get("total")?;

        let rows = sqlx::query(
            "SELECT * FROM threads WHERE author_id = ?1
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
        )
        .bind(author_id)
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        let threads: Vec<Thread> = rows.iter().map(row_to_thread).collect::<SkeinResult<_>>()?;
        let items = self.enrich_page(threads, viewer_id).await?;

        Ok(ThreadPage {
            items,
            pagination: Pagination::new(page, page_size, total),
        })
    }

    /// Plain substring search over thread content, with the same privacy
    /// exclusion as the explore feed
    pub async fn search(
        &self,
        query: &str,
        page: i64,
        page_size: i64,
        viewer_id: Option<&str>,
    ) -> SkeinResult<ThreadPage> {
        let (page, page_size) = clamp_page(page, page_size);
        let hidden = self.visibility.hidden_author_ids(viewer_id).await?;

        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let mut filter = "WHERE content LIKE ? ESCAPE '\\'".to_string();
        if !hidden.is_empty() {
            filter.push_str(&format!(
                " AND author_id NOT IN ({})",
                sql_placeholders(hidden.len())
            ));
        }

        let count_str = format!("SELECT COUNT(*) AS total FROM threads {}", filter);
        let mut count_query = sqlx::query(&count_str).bind(&pattern);
        for id in &hidden {
            count_query = count_query.bind(id);
        }
        let total: i64 = count_query
            .fetch_one(&self.db)
            .await
            .map_err(SkeinError::Database)?
            .try_get("total")?;

        let select_str = format!(
            "SELECT * FROM threads {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            filter
        );
        let mut select_query = sqlx::query(&select_str).bind(&pattern);
        for id in &hidden {
            select_query = select_query.bind(id);
        }
        let rows = select_query
            .bind(page_size)
            .bind((page - 1) * page_size)
            .fetch_all(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        let threads: Vec<Thread> = rows.iter().map(row_to_thread).collect::<SkeinResult<_>>()?;
        let items = self.enrich_page(threads, viewer_id).await?;

        Ok(ThreadPage {
            items,
            pagination: Pagination::new(page, page_size, total),
        })
    }

    /// Single-thread read with the same enrichment as listings
    pub async fn get_thread(
        &self,
        thread_id: &str,
        viewer_id: Option<&str>,
    ) -> SkeinResult<ThreadView> {
        let row = sqlx::query("SELECT * FROM threads WHERE id = ?1")
            .bind(thread_id)
            .fetch_optional(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        let thread = match row {
            Some(row) => row_to_thread(&row)?,
            None => {
                return Err(SkeinError::NotFound(format!(
                    "Thread {} not found",
                    thread_id
                )))
            }
        };

        self.visibility
            .assert_can_view(viewer_id, &thread.author_id)
            .await?;

        let mut items = self.enrich_page(vec![thread], viewer_id).await?;
        items
            .pop()
            .ok_or_else(|| SkeinError::NotFound(format!("Thread {} not found", thread_id)))
    }

    /// Attach authors, one level of repost resolution and per-viewer state
    /// to a page of threads
    async fn enrich_page(
        &self,
        threads: Vec<Thread>,
        viewer_id: Option<&str>,
    ) -> SkeinResult<Vec<ThreadView>> {
        if threads.is_empty() {
            return Ok(Vec::new());
        }

        // Resolve one level of repost indirection for the whole page
        let source_ids: Vec<String> = collect_unique(
            threads.iter().filter_map(|t| t.reposted_from.clone()),
        );
        let originals = self.fetch_threads(&source_ids).await?;

        let reply_ids: Vec<String> = collect_unique(
            threads.iter().filter_map(|t| t.reposted_from_reply.clone()),
        );
        let quoted_replies = self.fetch_reply_contexts(&reply_ids).await?;

        // Everyone shown on this page, including original authors
        let author_ids: Vec<String> = collect_unique(
            threads
                .iter()
                .map(|t| t.author_id.clone())
                .chain(originals.values().map(|t| t.author_id.clone()))
                .chain(quoted_replies.values().map(|(_, author_id)| author_id.clone())),
        );
        let authors = self.users.get_users(&author_ids).await?;

        let maps = match viewer_id {
            Some(viewer) => {
                self.build_viewer_maps(viewer, &threads, &originals, &author_ids)
                    .await?
            }
            None => ViewerMaps::default(),
        };

        let mut views = Vec::with_capacity(threads.len());
        for thread in &threads {
            let Some(author) = authors.get(&thread.author_id) else {
                continue; // author deleted between queries
            };

            let reposted_from = thread.reposted_from.as_ref().and_then(|source_id| {
                let original = originals.get(source_id)?;
                let original_author = authors.get(&original.author_id)?;
                Some(Box::new(RepostSource {
                    id: original.id.clone(),
                    author: self.author_view(original_author, viewer_id, &maps),
                    content: original.content.clone(),
                    media_url: original.media_url.clone(),
                    media_kind: original.media_kind,
                    likes_count: original.likes_count,
                    replies_count: original.replies_count,
                    reposts_count: original.reposts_count,
                    is_liked: viewer_id.map(|_| maps.liked.contains(&original.id)),
                    created_at: original.created_at,
                }))
            });

            let reposted_from_reply = thread.reposted_from_reply.as_ref().and_then(|reply_id| {
                let (content, author_id) = quoted_replies.get(reply_id)?;
                let reply_author = authors.get(author_id)?;
                Some(RepostedReply {
                    id: reply_id.clone(),
                    author: self.author_view(reply_author, viewer_id, &maps),
                    content: content.clone(),
                })
            });

            let is_reposted = viewer_id.map(|_| {
                if let Some(reply_id) = &thread.reposted_from_reply {
                    maps.reply_repost_sources.contains(reply_id)
                } else {
                    maps.repost_sources
                        .contains(thread.repost_source_id())
                }
            });

            views.push(ThreadView {
                id: thread.id.clone(),
                author: self.author_view(author, viewer_id, &maps),
                content: thread.content.clone(),
                media_url: thread.media_url.clone(),
                media_kind: thread.media_kind,
                likes_count: thread.likes_count,
                replies_count: thread.replies_count,
                reposts_count: thread.reposts_count,
                reposted_from,
                reposted_from_reply,
                is_liked: viewer_id.map(|_| maps.liked.contains(&thread.id)),
                is_reposted,
                created_at: thread.created_at,
                updated_at: thread.updated_at,
            });
        }

        Ok(views)
    }

    /// Author projection with per-viewer follow annotations
    fn author_view(&self, user: &User, viewer_id: Option<&str>, maps: &ViewerMaps) -> UserView {
        let mut view = UserView::from(user);
        if let Some(viewer) = viewer_id {
            if viewer != user.id {
                let status = maps.follow_status.get(&user.id);
                view.is_following = Some(matches!(status, Some(FollowStatus::Accepted)));
                view.follow_status = status.map(|s| s.as_str().to_string());
            }
        }
        view
    }

    /// Build the page-scoped per-viewer lookup maps in one pass
    async fn build_viewer_maps(
        &self,
        viewer: &str,
        threads: &[Thread],
        originals: &HashMap<String, Thread>,
        author_ids: &[String],
    ) -> SkeinResult<ViewerMaps> {
        // Every thread id whose like state the page can show
        let like_targets: Vec<String> = collect_unique(
            threads
                .iter()
                .map(|t| t.id.clone())
                .chain(originals.keys().cloned()),
        );

        let mut liked = HashSet::new();
        if !like_targets.is_empty() {
            let query_str = format!(
                "SELECT thread_id FROM likes WHERE user_id = ? AND thread_id IN ({})",
                sql_placeholders(like_targets.len())
            );
            let mut query = sqlx::query(&query_str).bind(viewer);
            for id in &like_targets {
                query = query.bind(id);
            }
            for row in query.fetch_all(&self.db).await.map_err(SkeinError::Database)? {
                liked.insert(row.try_get::<String, _>("thread_id")?);
            }
        }

        // The viewer's own repost records, one lookup for the whole page
        let mut repost_sources = HashSet::new();
        let mut reply_repost_sources = HashSet::new();
        let rows = sqlx::query(
            "SELECT reposted_from, reposted_from_reply FROM threads
             WHERE author_id = ?1
               AND (reposted_from IS NOT NULL OR reposted_from_reply IS NOT NULL)",
        )
        .bind(viewer)
        .fetch_all(&self.db)
        .await
        .map_err(SkeinError::Database)?;
        for row in rows {
            if let Some(source) = row.try_get::<Option<String>, _>("reposted_from")? {
                repost_sources.insert(source);
            }
            if let Some(source) = row.try_get::<Option<String>, _>("reposted_from_reply")? {
                reply_repost_sources.insert(source);
            }
        }

        let follow_status = self.follows.status_map(viewer, author_ids).await?;

        Ok(ViewerMaps {
            liked,
            repost_sources,
            reply_repost_sources,
            follow_status,
        })
    }

    /// Bulk fetch threads by id
    async fn fetch_threads(&self, ids: &[String]) -> SkeinResult<HashMap<String, Thread>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query_str = format!(
            "SELECT * FROM threads WHERE id IN ({})",
            sql_placeholders(ids.len())
        );
        let mut query = sqlx::query(&query_str);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.db).await.map_err(SkeinError::Database)?;

        let mut threads = HashMap::with_capacity(rows.len());
        for row in rows {
            let thread = row_to_thread(&row)?;
            threads.insert(thread.id.clone(), thread);
        }
        Ok(threads)
    }

    /// Bulk fetch (content, author) for quoted replies
    async fn fetch_reply_contexts(
        &self,
        ids: &[String],
    ) -> SkeinResult<HashMap<String, (String, String)>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query_str = format!(
            "SELECT id, content, author_id FROM replies WHERE id IN ({})",
            sql_placeholders(ids.len())
        );
        let mut query = sqlx::query(&query_str);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.db).await.map_err(SkeinError::Database)?;

        let mut contexts = HashMap::with_capacity(rows.len());
        for row in rows {
            contexts.insert(
                row.try_get::<String, _>("id")?,
                (
                    row.try_get::<String, _>("content")?,
                    row.try_get::<String, _>("author_id")?,
                ),
            );
        }
        Ok(contexts)
    }
}

/// Normalize page/page_size inputs
fn clamp_page(page: i64, page_size: i64) -> (i64, i64) {
    (page.max(1), page_size.clamp(1, 100))
}

/// Dedup while keeping first-seen order
fn collect_unique(iter: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in iter {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_math() {
        let p = Pagination::new(1, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_more);

        let p = Pagination::new(3, 10, 25);
        assert!(!p.has_more);

        let p = Pagination::new(1, 10, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_more);

        let p = Pagination::new(2, 10, 20);
        assert_eq!(p.total_pages, 2);
        assert!(!p.has_more);
    }

    #[test]
    fn collect_unique_keeps_first_seen_order() {
        let items = ["b", "a", "b", "c"].into_iter().map(str::to_string);
        assert_eq!(collect_unique(items), vec!["b", "a", "c"]);
    }
}
