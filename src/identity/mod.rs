/// Identity store
///
/// Resolves users by id or username and owns the profile fields the engine
/// needs: display name, username, privacy flag, email, verification flag,
/// avatar and the mention-permission policy.
use crate::error::{SkeinError, SkeinResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

/// Who may mention a user in thread or reply content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionPolicy {
    Everyone,
    Followers,
    Nobody,
}

impl MentionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MentionPolicy::Everyone => "everyone",
            MentionPolicy::Followers => "followers",
            MentionPolicy::Nobody => "nobody",
        }
    }
}

impl From<&str> for MentionPolicy {
    fn from(s: &str) -> Self {
        match s {
            "followers" => MentionPolicy::Followers,
            "nobody" => MentionPolicy::Nobody,
            _ => MentionPolicy::Everyone,
        }
    }
}

/// A user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub is_private: bool,
    pub is_verified: bool,
    pub allow_mentions_from: MentionPolicy,
    pub created_at: DateTime<Utc>,
}

/// Public author projection embedded in feed items and reply trees
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_status: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
            is_verified: user.is_verified,
            is_following: None,
            follow_status: None,
        }
    }
}

/// Parameters for creating a user
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub is_private: bool,
}

/// User store service
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    /// Create a new user store
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a new user
    pub async fn create_user(&self, new_user: NewUser) -> SkeinResult<User> {
        self.validate_username(&new_user.username)?;

        if let Some(ref email) = new_user.email {
            if !email.contains('@') {
                return Err(SkeinError::Validation("Invalid email format".to_string()));
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let display_name = if new_user.display_name.is_empty() {
            new_user.username.clone()
        } else {
            new_user.display_name.clone()
        };

        sqlx::query(
            "INSERT INTO users (id, username, display_name, email, avatar_url, is_private, is_verified, allow_mentions_from, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&id)
        .bind(&new_user.username)
        .bind(&display_name)
        .bind(&new_user.email)
        .bind(&new_user.avatar_url)
        .bind(new_user.is_private)
        .bind(false)
        .bind(MentionPolicy::Everyone.as_str())
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| {
            let err = SkeinError::Database(e);
            if err.is_unique_violation() {
                SkeinError::Conflict(format!("Username {} already taken", new_user.username))
            } else {
                err
            }
        })?;

        Ok(User {
            id,
            username: new_user.username,
            display_name,
            email: new_user.email,
            avatar_url: new_user.avatar_url,
            is_private: new_user.is_private,
            is_verified: false,
            allow_mentions_from: MentionPolicy::Everyone,
            created_at: now,
        })
    }

    /// Get a user by id
    pub async fn get_user(&self, id: &str) -> SkeinResult<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        match row {
            Some(row) => row_to_user(&row),
            None => Err(SkeinError::NotFound(format!("User {} not found", id))),
        }
    }

    /// Find a user by username, case-insensitively. Returns None for an
    /// unknown handle instead of an error so mention resolution can skip it.
    pub async fn find_by_username(&self, username: &str) -> SkeinResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Bulk fetch users by id, for page-scoped enrichment
    pub async fn get_users(&self, ids: &[String]) -> SkeinResult<HashMap<String, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = sql_placeholders(ids.len());
        let query_str = format!("SELECT * FROM users WHERE id IN ({})", placeholders);

        let mut query = sqlx::query(&query_str);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.db).await.map_err(SkeinError::Database)?;

        let mut users = HashMap::with_capacity(rows.len());
        for row in rows {
            let user = row_to_user(&row)?;
            users.insert(user.id.clone(), user);
        }

        Ok(users)
    }

    /// Update the mention-permission policy for a user
    pub async fn set_mention_policy(&self, user_id: &str, policy: MentionPolicy) -> SkeinResult<()> {
        let result = sqlx::query("UPDATE users SET allow_mentions_from = ?1 WHERE id = ?2")
            .bind(policy.as_str())
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(SkeinError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SkeinError::NotFound(format!("User {} not found", user_id)));
        }

        Ok(())
    }

    /// Validate username format
    fn validate_username(&self, username: &str) -> SkeinResult<()> {
        if username.is_empty() {
            return Err(SkeinError::Validation("Username cannot be empty".to_string()));
        }

        if username.len() < 3 {
            return Err(SkeinError::Validation(
                "Username must be at least 3 characters".to_string(),
            ));
        }

        if username.len() > 32 {
            return Err(SkeinError::Validation("Username too long".to_string()));
        }

        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(SkeinError::Validation(
                "Username contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }
}

/// Convert a database row to a User
pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> SkeinResult<User> {
    let policy: String = row.try_get("allow_mentions_from")?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        avatar_url: row.try_get("avatar_url")?,
        is_private: row.try_get("is_private")?,
        is_verified: row.try_get("is_verified")?,
        allow_mentions_from: MentionPolicy::from(policy.as_str()),
        created_at: row.try_get("created_at")?,
    })
}

/// Positional placeholder list for dynamically sized IN clauses
pub(crate) fn sql_placeholders(count: usize) -> String {
    std::iter::repeat("?")
        .take(count)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_policy_round_trips() {
        for policy in [
            MentionPolicy::Everyone,
            MentionPolicy::Followers,
            MentionPolicy::Nobody,
        ] {
            assert_eq!(MentionPolicy::from(policy.as_str()), policy);
        }
    }

    #[test]
    fn unknown_policy_defaults_to_everyone() {
        assert_eq!(MentionPolicy::from("whatever"), MentionPolicy::Everyone);
    }

    #[test]
    fn placeholders_are_comma_separated() {
        assert_eq!(sql_placeholders(1), "?");
        assert_eq!(sql_placeholders(3), "?, ?, ?");
    }
}
