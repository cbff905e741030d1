/// API routes and handlers
pub mod feed;
pub mod gateway;
pub mod health;
pub mod middleware;
pub mod notifications;
pub mod replies;
pub mod threads;

use crate::context::AppContext;
use axum::Router;
use serde::Deserialize;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(feed::routes())
        .merge(threads::routes())
        .merge(replies::routes())
        .merge(notifications::routes())
        .merge(gateway::routes())
}

/// Offset pagination query parameters
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}
