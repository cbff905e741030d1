/// Reply trees: ordering, counters, cycle defense and subtree replication
mod common;

use chrono::Utc;
use common::{post, reply, test_context, user};
use skein::error::SkeinError;
use skein::replies::models::Reply;
use sqlx::Row;

#[tokio::test]
async fn tree_orders_roots_newest_first_and_children_oldest_first() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let thread = post(&ctx, &alice, "root").await;

    let r1 = reply(&ctx, &bob, &thread.id, None, "first").await;
    let r2 = reply(&ctx, &alice, &thread.id, None, "second").await;
    let c1 = reply(&ctx, &alice, &thread.id, Some(&r1.id), "child one").await;
    let c2 = reply(&ctx, &bob, &thread.id, Some(&r1.id), "child two").await;
    reply(&ctx, &bob, &thread.id, Some(&c1.id), "grandchild").await;

    let tree = ctx.tree.get_tree(&thread.id).await.unwrap();

    // Top level newest first
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[0].id, r2.id);
    assert_eq!(tree[1].id, r1.id);

    // Children at every depth oldest first, replies_count covers immediate
    // children only
    let r1_node = &tree[1];
    assert_eq!(r1_node.replies_count, 2);
    assert_eq!(r1_node.children[0].id, c1.id);
    assert_eq!(r1_node.children[1].id, c2.id);
    assert_eq!(r1_node.children[0].replies_count, 1);
    assert_eq!(r1_node.children[0].children[0].content, "grandchild");
}

#[tokio::test]
async fn thread_replies_count_tracks_direct_replies_only() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let thread = post(&ctx, &alice, "root").await;
    let bob = user(&ctx, "bob").await;

    let top = reply(&ctx, &bob, &thread.id, None, "top").await;
    reply(&ctx, &alice, &thread.id, Some(&top.id), "nested").await;
    reply(&ctx, &bob, &thread.id, Some(&top.id), "nested two").await;

    let record = ctx.threads.get_thread_record(&thread.id).await.unwrap();
    assert_eq!(record.replies_count, 1);

    ctx.replies.delete_reply(&bob.id, &top.id).await.unwrap();
    let record = ctx.threads.get_thread_record(&thread.id).await.unwrap();
    assert_eq!(record.replies_count, 0);

    // Cascade removed the nested descendants as well
    let tree = ctx.tree.get_tree(&thread.id).await.unwrap();
    assert!(tree.is_empty());
}

#[tokio::test]
async fn reply_to_a_parent_from_another_thread_is_rejected() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let thread_a = post(&ctx, &alice, "thread a").await;
    let thread_b = post(&ctx, &alice, "thread b").await;
    let parent = reply(&ctx, &alice, &thread_a.id, None, "in a").await;

    let err = ctx
        .replies
        .create_reply(skein::replies::NewReply {
            author_id: alice.id.clone(),
            thread_id: thread_b.id.clone(),
            parent_reply_id: Some(parent.id.clone()),
            content: "crossing threads".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SkeinError::Validation(_)));
}

/// Insert a reply row directly, bypassing the service, to build corrupted
/// fixtures
async fn raw_reply(ctx: &skein::context::AppContext, reply: &Reply) {
    // Bypass referential integrity so a mutually-referential cycle can be
    // inserted as a corrupted fixture; no row order satisfies the FK here.
    let mut conn = ctx.db.acquire().await.unwrap();
    sqlx::query("PRAGMA foreign_keys = OFF")
        .execute(&mut *conn)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO replies (id, thread_id, author_id, parent_reply_id, content, likes_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
    )
    .bind(&reply.id)
    .bind(&reply.thread_id)
    .bind(&reply.author_id)
    .bind(&reply.parent_reply_id)
    .bind(&reply.content)
    .bind(reply.created_at)
    .bind(reply.updated_at)
    .execute(&mut *conn)
    .await
    .unwrap();
}

#[tokio::test]
async fn forced_cycle_fails_closed() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let thread = post(&ctx, &alice, "root").await;

    let now = Utc::now();
    let a = Reply {
        id: "cyc-a".to_string(),
        thread_id: thread.id.clone(),
        author_id: alice.id.clone(),
        parent_reply_id: Some("cyc-b".to_string()),
        content: "a".to_string(),
        likes_count: 0,
        created_at: now,
        updated_at: now,
    };
    let b = Reply {
        parent_reply_id: Some("cyc-a".to_string()),
        id: "cyc-b".to_string(),
        content: "b".to_string(),
        ..a.clone()
    };
    raw_reply(&ctx, &a).await;
    raw_reply(&ctx, &b).await;

    let err = ctx.tree.get_tree(&thread.id).await.unwrap_err();
    assert!(matches!(err, SkeinError::Integrity(_)));
}

#[tokio::test]
async fn repost_reply_duplicates_the_descendant_subtree() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let carol = user(&ctx, "carol").await;
    let thread = post(&ctx, &alice, "root").await;

    // bob's reply carries a small subtree: two children, one grandchild
    let source = reply(&ctx, &bob, &thread.id, None, "worth quoting").await;
    let c1 = reply(&ctx, &alice, &thread.id, Some(&source.id), "child one").await;
    let c2 = reply(&ctx, &carol, &thread.id, Some(&source.id), "child two").await;
    reply(&ctx, &bob, &thread.id, Some(&c1.id), "grandchild").await;
    // unrelated sibling must not be copied
    reply(&ctx, &carol, &thread.id, None, "unrelated").await;

    let new_thread = ctx
        .tree
        .repost_reply_as_thread(&carol.id, &source.id)
        .await
        .unwrap();

    assert_eq!(new_thread.author_id, carol.id);
    assert_eq!(new_thread.reposted_from_reply.as_deref(), Some(source.id.as_str()));
    assert!(new_thread.content.starts_with("@bob"));
    assert!(new_thread.content.contains("worth quoting"));

    // First-level children only
    assert_eq!(new_thread.replies_count, 2);

    let tree = ctx.tree.get_tree(&new_thread.id).await.unwrap();
    assert_eq!(tree.len(), 2);

    // Original authors preserved, structure re-rooted onto copied parents
    let copied_c1 = tree
        .iter()
        .find(|n| n.content == "child one")
        .expect("copied child one");
    assert_eq!(copied_c1.author.username, "alice");
    assert_eq!(copied_c1.children.len(), 1);
    assert_eq!(copied_c1.children[0].content, "grandchild");
    assert_eq!(copied_c1.children[0].author.username, "bob");

    let copied_c2 = tree.iter().find(|n| n.content == "child two").unwrap();
    assert_eq!(copied_c2.author.username, "carol");
    assert!(copied_c2.children.is_empty());

    // Copies got fresh ids and point at the new thread, not the old one
    assert_ne!(copied_c1.id, c1.id);
    assert_ne!(copied_c2.id, c2.id);
    let copied_total: i64 =
        sqlx::query("SELECT COUNT(*) AS n FROM replies WHERE thread_id = ?1")
            .bind(&new_thread.id)
            .fetch_one(&ctx.db)
            .await
            .unwrap()
            .try_get("n")
            .unwrap();
    assert_eq!(copied_total, 3);
}

#[tokio::test]
async fn reply_repost_conflicts() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let thread = post(&ctx, &alice, "root").await;
    let source = reply(&ctx, &bob, &thread.id, None, "quote me").await;

    // The original author cannot repost their own reply
    let err = ctx
        .tree
        .repost_reply_as_thread(&bob.id, &source.id)
        .await
        .unwrap_err();
    assert!(matches!(err, SkeinError::Conflict(_)));

    // One repost per (actor, reply) pair
    ctx.tree
        .repost_reply_as_thread(&alice.id, &source.id)
        .await
        .unwrap();
    let err = ctx
        .tree
        .repost_reply_as_thread(&alice.id, &source.id)
        .await
        .unwrap_err();
    assert!(matches!(err, SkeinError::Conflict(_)));
}

#[tokio::test]
async fn reply_likes_track_their_own_counter() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let thread = post(&ctx, &alice, "root").await;
    let target = reply(&ctx, &alice, &thread.id, None, "like this reply").await;

    let liked = ctx.replies.like_reply(&bob.id, &target.id).await.unwrap();
    assert_eq!(liked.likes_count, 1);

    let err = ctx.replies.like_reply(&bob.id, &target.id).await.unwrap_err();
    assert!(matches!(err, SkeinError::Conflict(_)));

    let unliked = ctx.replies.unlike_reply(&bob.id, &target.id).await.unwrap();
    assert_eq!(unliked.likes_count, 0);
}
