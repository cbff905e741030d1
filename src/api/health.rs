/// Health check endpoint
use crate::context::AppContext;
use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/health", get(health_check))
}

/// Health check handler
async fn health_check(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let database = crate::db::test_connection(&ctx.db).await.is_ok();

    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "connections": ctx.gateway.registry().online_count().await,
    }))
}
