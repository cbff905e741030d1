/// Reply endpoints: tree reads, CRUD, likes and repost-as-thread
use crate::{
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::{SkeinError, SkeinResult},
    replies::{NewReply, Reply, ReplyNode},
    threads::Thread,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/threads/:id/replies",
            get(get_tree).post(create_reply),
        )
        .route("/api/replies/:id", patch(update_reply).delete(delete_reply))
        .route(
            "/api/replies/:id/like",
            post(like_reply).delete(unlike_reply),
        )
        .route("/api/replies/:id/repost", post(repost_reply))
}

/// Create-reply payload
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReplyRequest {
    #[validate(length(min = 1, max = 500, message = "content must be 1-500 characters"))]
    pub content: String,
    pub parent_reply_id: Option<String>,
}

/// Update-reply payload
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReplyRequest {
    #[validate(length(min = 1, max = 500, message = "content must be 1-500 characters"))]
    pub content: String,
}

/// Full nested reply tree of a thread
async fn get_tree(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(thread_id): Path<String>,
) -> SkeinResult<Json<Vec<ReplyNode>>> {
    let thread = ctx.threads.get_thread_record(&thread_id).await?;
    ctx.visibility
        .assert_can_view(auth.viewer_id(), &thread.author_id)
        .await?;

    let tree = ctx.tree.get_tree(&thread_id).await?;
    Ok(Json(tree))
}

async fn create_reply(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(thread_id): Path<String>,
    Json(payload): Json<CreateReplyRequest>,
) -> SkeinResult<(StatusCode, Json<Reply>)> {
    payload
        .validate()
        .map_err(|e| SkeinError::Validation(e.to_string()))?;

    let reply = ctx
        .replies
        .create_reply(NewReply {
            author_id: auth.user_id,
            thread_id,
            parent_reply_id: payload.parent_reply_id,
            content: payload.content,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

async fn update_reply(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(payload): Json<UpdateReplyRequest>,
) -> SkeinResult<Json<Reply>> {
    payload
        .validate()
        .map_err(|e| SkeinError::Validation(e.to_string()))?;

    let reply = ctx
        .replies
        .update_reply(&auth.user_id, &id, payload.content)
        .await?;
    Ok(Json(reply))
}

async fn delete_reply(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<StatusCode> {
    ctx.replies.delete_reply(&auth.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_reply(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<Json<Reply>> {
    let reply = ctx.replies.like_reply(&auth.user_id, &id).await?;
    Ok(Json(reply))
}

async fn unlike_reply(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<Json<Reply>> {
    let reply = ctx.replies.unlike_reply(&auth.user_id, &id).await?;
    Ok(Json(reply))
}

/// Repost a reply as a new thread, duplicating its descendant subtree
async fn repost_reply(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> SkeinResult<(StatusCode, Json<Thread>)> {
    let thread = ctx.tree.repost_reply_as_thread(&auth.user_id, &id).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}
