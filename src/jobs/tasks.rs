/// Background task implementations
use crate::{context::AppContext, error::SkeinResult};
use chrono::{Duration, Utc};

/// Read notifications older than this are eligible for pruning
const NOTIFICATION_RETENTION_DAYS: i64 = 30;

/// Delete read notifications past the retention window
pub async fn prune_read_notifications(ctx: &AppContext) -> SkeinResult<u64> {
    let cutoff = Utc::now() - Duration::days(NOTIFICATION_RETENTION_DAYS);

    let result = sqlx::query("DELETE FROM notifications WHERE read = 1 AND created_at < ?1")
        .bind(cutoff)
        .execute(&ctx.db)
        .await?;

    Ok(result.rows_affected())
}

/// Health check - verify the database is reachable
pub async fn health_check(ctx: &AppContext) -> SkeinResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    Ok(())
}
