/// Feed and search endpoints
use crate::{
    api::PageParams,
    auth::OptionalAuthContext,
    context::AppContext,
    error::SkeinResult,
    feed::ThreadPage,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/feed", get(list_explore))
        .route("/api/feed/following", get(list_followed))
        .route("/api/users/:user_id/threads", get(list_by_author))
        .route("/api/search", get(search))
}

/// Global explore feed
async fn list_explore(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Query(params): Query<PageParams>,
) -> SkeinResult<Json<ThreadPage>> {
    let page = ctx
        .feed
        .list_explore(params.page, params.page_size, auth.viewer_id())
        .await?;
    Ok(Json(page))
}

/// Followed + public feed; explore when unauthenticated
async fn list_followed(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Query(params): Query<PageParams>,
) -> SkeinResult<Json<ThreadPage>> {
    let page = ctx
        .feed
        .list_followed(params.page, params.page_size, auth.viewer_id())
        .await?;
    Ok(Json(page))
}

/// Threads of one author
async fn list_by_author(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(user_id): Path<String>,
    Query(params): Query<PageParams>,
) -> SkeinResult<Json<ThreadPage>> {
    let page = ctx
        .feed
        .list_by_author(&user_id, params.page, params.page_size, auth.viewer_id())
        .await?;
    Ok(Json(page))
}

/// Substring search parameters
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "crate::api::default_page")]
    pub page: i64,
    #[serde(default = "crate::api::default_page_size")]
    pub page_size: i64,
}

/// Substring search over thread content
async fn search(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Query(params): Query<SearchParams>,
) -> SkeinResult<Json<ThreadPage>> {
    let page = ctx
        .feed
        .search(&params.q, params.page, params.page_size, auth.viewer_id())
        .await?;
    Ok(Json(page))
}
