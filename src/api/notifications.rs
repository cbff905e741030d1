/// Notification endpoints
use crate::{
    api::PageParams,
    auth::AuthContext,
    context::AppContext,
    error::SkeinResult,
    notifications::engine::NotificationPage,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/notifications",
            get(list_notifications).delete(delete_all),
        )
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id/read", post(mark_read))
        .route("/api/notifications/:id", axum::routing::delete(delete_one))
}

async fn list_notifications(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
) -> SkeinResult<Json<NotificationPage>> {
    let page = ctx
        .notifications
        .list(&auth.user_id, params.page, params.page_size)
        .await?;
    Ok(Json(page))
}

async fn unread_count(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> SkeinResult<Json<serde_json::Value>> {
    let count = ctx.notifications.unread_count(&auth.user_id).await?;
    Ok(Json(json!({ "count": count })))
}

async fn mark_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<StatusCode> {
    ctx.notifications.mark_read(&auth.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> SkeinResult<Json<serde_json::Value>> {
    let updated = ctx.notifications.mark_all_read(&auth.user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn delete_one(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<StatusCode> {
    ctx.notifications.delete(&auth.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_all(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> SkeinResult<Json<serde_json::Value>> {
    let deleted = ctx.notifications.delete_all(&auth.user_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
