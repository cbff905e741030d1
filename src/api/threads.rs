/// Thread endpoints: CRUD, like/unlike, repost/unrepost
use crate::{
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::{SkeinError, SkeinResult},
    feed::ThreadView,
    threads::{Media, MediaKind, NewThread, Thread},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/threads", post(create_thread))
        .route(
            "/api/threads/:id",
            get(get_thread).patch(update_thread).delete(delete_thread),
        )
        .route(
            "/api/threads/:id/like",
            post(like_thread).delete(unlike_thread),
        )
        .route(
            "/api/threads/:id/repost",
            post(repost_thread).delete(unrepost_thread),
        )
}

/// Create-thread payload
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadRequest {
    #[validate(length(max = 500, message = "content exceeds 500 characters"))]
    #[serde(default)]
    pub content: String,
    #[validate(url(message = "media url is not valid"))]
    pub media_url: Option<String>,
    pub media_kind: Option<MediaKind>,
}

/// Update-thread payload
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateThreadRequest {
    #[validate(length(min = 1, max = 500, message = "content must be 1-500 characters"))]
    pub content: String,
}

async fn create_thread(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(payload): Json<CreateThreadRequest>,
) -> SkeinResult<(StatusCode, Json<Thread>)> {
    payload
        .validate()
        .map_err(|e| SkeinError::Validation(e.to_string()))?;

    let media = match (payload.media_url, payload.media_kind) {
        (Some(url), Some(kind)) => Some(Media { url, kind }),
        (Some(_), None) | (None, Some(_)) => {
            return Err(SkeinError::Validation(
                "Media requires both url and kind".to_string(),
            ));
        }
        (None, None) => None,
    };

    let thread = ctx
        .threads
        .create_thread(NewThread {
            author_id: auth.user_id,
            content: payload.content,
            media,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(thread)))
}

async fn get_thread(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(id): Path<String>,
) -> SkeinResult<Json<ThreadView>> {
    let view = ctx.feed.get_thread(&id, auth.viewer_id()).await?;
    Ok(Json(view))
}

async fn update_thread(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(payload): Json<UpdateThreadRequest>,
) -> SkeinResult<Json<Thread>> {
    payload
        .validate()
        .map_err(|e| SkeinError::Validation(e.to_string()))?;

    let thread = ctx
        .threads
        .update_thread(&auth.user_id, &id, payload.content)
        .await?;
    Ok(Json(thread))
}

async fn delete_thread(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<StatusCode> {
    ctx.threads.delete_thread(&auth.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_thread(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<Json<Thread>> {
    let thread = ctx.threads.like_thread(&auth.user_id, &id).await?;
    Ok(Json(thread))
}

async fn unlike_thread(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<Json<Thread>> {
    let thread = ctx.threads.unlike_thread(&auth.user_id, &id).await?;
    Ok(Json(thread))
}

async fn repost_thread(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<(StatusCode, Json<Thread>)> {
    let repost = ctx.threads.repost_thread(&auth.user_id, &id).await?;
    Ok((StatusCode::CREATED, Json(repost)))
}

/// Remove the caller's repost of this thread
async fn unrepost_thread(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<StatusCode> {
    ctx.threads.unrepost_thread(&auth.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
