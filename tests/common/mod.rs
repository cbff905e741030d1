//! Shared fixtures for the integration test suites
#![allow(dead_code)]

use skein::{
    config::{
        AuthConfig, LoggingConfig, RateLimitSettings, ServerConfig, ServiceConfig, StorageConfig,
    },
    context::AppContext,
    db,
    identity::{NewUser, User},
};
use std::path::PathBuf;

/// A config good enough for wiring services in tests
pub fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            public_url: "http://127.0.0.1:0".to_string(),
        },
        storage: StorageConfig {
            data_directory: PathBuf::from("."),
            database: PathBuf::from(":memory:"),
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret-0123456789".to_string(),
        },
        email: None,
        rate_limit: RateLimitSettings {
            enabled: false,
            ..RateLimitSettings::default()
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
    }
}

/// Fresh in-memory context with migrations applied
pub async fn test_context() -> AppContext {
    let pool = db::create_memory_pool().await.expect("memory pool");
    db::run_migrations(&pool).await.expect("migrations");
    AppContext::from_pool(test_config(), pool).expect("context wiring")
}

/// Create a public user
pub async fn user(ctx: &AppContext, username: &str) -> User {
    ctx.users
        .create_user(NewUser {
            username: username.to_string(),
            display_name: username.to_string(),
            ..NewUser::default()
        })
        .await
        .expect("create user")
}

/// Create a private user
pub async fn private_user(ctx: &AppContext, username: &str) -> User {
    ctx.users
        .create_user(NewUser {
            username: username.to_string(),
            display_name: username.to_string(),
            is_private: true,
            ..NewUser::default()
        })
        .await
        .expect("create private user")
}

/// Post a thread and wait a beat so created_at ordering is deterministic
pub async fn post(ctx: &AppContext, author: &User, content: &str) -> skein::threads::Thread {
    let thread = ctx
        .threads
        .create_thread(skein::threads::NewThread {
            author_id: author.id.clone(),
            content: content.to_string(),
            media: None,
        })
        .await
        .expect("create thread");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    thread
}

/// Reply to a thread, optionally nested, with the same ordering beat
pub async fn reply(
    ctx: &AppContext,
    author: &User,
    thread_id: &str,
    parent: Option<&str>,
    content: &str,
) -> skein::replies::Reply {
    let reply = ctx
        .replies
        .create_reply(skein::replies::NewReply {
            author_id: author.id.clone(),
            thread_id: thread_id.to_string(),
            parent_reply_id: parent.map(str::to_string),
            content: content.to_string(),
        })
        .await
        .expect("create reply");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    reply
}
