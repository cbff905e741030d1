/// Thread mutations: likes, reposts, ownership and counter consistency
mod common;

use common::{post, test_context, user};
use skein::error::SkeinError;
use sqlx::Row;

#[tokio::test]
async fn like_unlike_keeps_count_consistent_with_liker_set() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let thread = post(&ctx, &alice, "like me").await;

    let liked = ctx.threads.like_thread(&bob.id, &thread.id).await.unwrap();
    assert_eq!(liked.likes_count, 1);

    // The counter cache always matches the join-table truth
    let set_size: i64 = sqlx::query("SELECT COUNT(*) AS n FROM likes WHERE thread_id = ?1")
        .bind(&thread.id)
        .fetch_one(&ctx.db)
        .await
        .unwrap()
        .try_get("n")
        .unwrap();
    assert_eq!(set_size, liked.likes_count);

    let unliked = ctx.threads.unlike_thread(&bob.id, &thread.id).await.unwrap();
    assert_eq!(unliked.likes_count, 0);
}

#[tokio::test]
async fn second_like_conflicts_and_leaves_count_at_one() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let thread = post(&ctx, &alice, "double tap").await;

    ctx.threads.like_thread(&bob.id, &thread.id).await.unwrap();
    let err = ctx.threads.like_thread(&bob.id, &thread.id).await.unwrap_err();
    assert!(matches!(err, SkeinError::Conflict(_)));

    let record = ctx.threads.get_thread_record(&thread.id).await.unwrap();
    assert_eq!(record.likes_count, 1);
}

#[tokio::test]
async fn unlike_without_like_is_not_found() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let thread = post(&ctx, &alice, "nothing here").await;

    let err = ctx
        .threads
        .unlike_thread(&alice.id, &thread.id)
        .await
        .unwrap_err();
    assert!(matches!(err, SkeinError::NotFound(_)));
}

#[tokio::test]
async fn one_repost_per_author_and_source() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let thread = post(&ctx, &alice, "repostable").await;

    ctx.threads.repost_thread(&bob.id, &thread.id).await.unwrap();
    let err = ctx
        .threads
        .repost_thread(&bob.id, &thread.id)
        .await
        .unwrap_err();
    assert!(matches!(err, SkeinError::Conflict(_)));

    let record = ctx.threads.get_thread_record(&thread.id).await.unwrap();
    assert_eq!(record.reposts_count, 1);
}

#[tokio::test]
async fn self_repost_is_a_conflict() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let thread = post(&ctx, &alice, "my own").await;

    let err = ctx
        .threads
        .repost_thread(&alice.id, &thread.id)
        .await
        .unwrap_err();
    assert!(matches!(err, SkeinError::Conflict(_)));
}

#[tokio::test]
async fn unrepost_restores_the_source_count() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let thread = post(&ctx, &alice, "count me").await;

    let before = ctx.threads.get_thread_record(&thread.id).await.unwrap();
    ctx.threads.repost_thread(&bob.id, &thread.id).await.unwrap();
    assert_eq!(
        ctx.threads
            .get_thread_record(&thread.id)
            .await
            .unwrap()
            .reposts_count,
        before.reposts_count + 1
    );

    ctx.threads.unrepost_thread(&bob.id, &thread.id).await.unwrap();
    assert_eq!(
        ctx.threads
            .get_thread_record(&thread.id)
            .await
            .unwrap()
            .reposts_count,
        before.reposts_count
    );
}

#[tokio::test]
async fn deleting_a_repost_thread_also_restores_the_count() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let thread = post(&ctx, &alice, "source").await;

    let repost = ctx.threads.repost_thread(&bob.id, &thread.id).await.unwrap();
    ctx.threads.delete_thread(&bob.id, &repost.id).await.unwrap();

    let record = ctx.threads.get_thread_record(&thread.id).await.unwrap();
    assert_eq!(record.reposts_count, 0);
}

#[tokio::test]
async fn only_the_author_may_edit_or_delete() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let thread = post(&ctx, &alice, "hands off").await;

    let err = ctx
        .threads
        .update_thread(&bob.id, &thread.id, "hijacked".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, SkeinError::Authorization(_)));

    let err = ctx.threads.delete_thread(&bob.id, &thread.id).await.unwrap_err();
    assert!(matches!(err, SkeinError::Authorization(_)));

    let updated = ctx
        .threads
        .update_thread(&alice.id, &thread.id, "edited".to_string())
        .await
        .unwrap();
    assert_eq!(updated.content, "edited");
}

#[tokio::test]
async fn content_bounds_are_validated() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;

    let err = ctx
        .threads
        .create_thread(skein::threads::NewThread {
            author_id: alice.id.clone(),
            content: "  ".to_string(),
            media: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SkeinError::Validation(_)));

    let err = ctx
        .threads
        .create_thread(skein::threads::NewThread {
            author_id: alice.id.clone(),
            content: "x".repeat(501),
            media: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SkeinError::Validation(_)));

    // Media stands in for content
    let thread = ctx
        .threads
        .create_thread(skein::threads::NewThread {
            author_id: alice.id.clone(),
            content: String::new(),
            media: Some(skein::threads::Media {
                url: "https://cdn.example.com/cat.png".to_string(),
                kind: skein::threads::MediaKind::Image,
            }),
        })
        .await
        .unwrap();
    assert_eq!(thread.media_kind, Some(skein::threads::MediaKind::Image));
}

#[tokio::test]
async fn liking_a_missing_thread_is_not_found() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;

    let err = ctx.threads.like_thread(&alice.id, "missing").await.unwrap_err();
    assert!(matches!(err, SkeinError::NotFound(_)));
}
