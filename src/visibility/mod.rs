/// Visibility resolver
///
/// Decides whether a viewer may see an author's content. Public authors are
/// visible to everyone; private authors only to themselves and to accepted
/// followers. The bulk form produces the exclusion set applied to feed
/// queries BEFORE pagination so that totals and `has_more` reflect the
/// filtered set.
use crate::error::{SkeinError, SkeinResult};
use sqlx::{Row, SqlitePool};

/// Visibility resolver service
pub struct VisibilityResolver {
    db: SqlitePool,
}

impl VisibilityResolver {
    /// Create a new visibility resolver
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// May `viewer` see content authored by `author_id`?
    pub async fn can_view(&self, viewer_id: Option<&str>, author_id: &str) -> SkeinResult<bool> {
        if viewer_id == Some(author_id) {
            return Ok(true);
        }

        let row = sqlx::query("SELECT is_private FROM users WHERE id = ?1")
            .bind(author_id)
            .fetch_optional(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        let is_private: bool = match row {
            Some(row) => row.try_get("is_private")?,
            None => {
                return Err(SkeinError::NotFound(format!("User {} not found", author_id)));
            }
        };

        if !is_private {
            return Ok(true);
        }

        let viewer_id = match viewer_id {
            Some(id) => id,
            None => return Ok(false),
        };

        let follow = sqlx::query(
            "SELECT 1 FROM follows
             WHERE follower_id = ?1 AND following_id = ?2 AND status = 'accepted'",
        )
        .bind(viewer_id)
        .bind(author_id)
        .fetch_optional(&self.db)
        .await
        .map_err(SkeinError::Database)?;

        Ok(follow.is_some())
    }

    /// Gate a single read, raising the privacy error when denied
    pub async fn assert_can_view(
        &self,
        viewer_id: Option<&str>,
        author_id: &str,
    ) -> SkeinResult<()> {
        if self.can_view(viewer_id, author_id).await? {
            Ok(())
        } else {
            Err(SkeinError::Privacy(format!(
                "Content of user {} is not visible",
                author_id
            )))
        }
    }

    /// Authors whose content must be excluded from bulk listings for this
    /// viewer: private, not the viewer, not accepted-followed by the viewer.
    pub async fn hidden_author_ids(&self, viewer_id: Option<&str>) -> SkeinResult<Vec<String>> {
        let rows = match viewer_id {
            Some(viewer) => {
                sqlx::query(
                    "SELECT id FROM users
                     WHERE is_private = 1
                       AND id != ?1
                       AND id NOT IN (
                           SELECT following_id FROM follows
                           WHERE follower_id = ?1 AND status = 'accepted'
                       )",
                )
                .bind(viewer)
                .fetch_all(&self.db)
                .await
            }
            None => {
                sqlx::query("SELECT id FROM users WHERE is_private = 1")
                    .fetch_all(&self.db)
                    .await
            }
        }
        .map_err(SkeinError::Database)?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("id").map_err(SkeinError::Database))
            .collect()
    }
}
