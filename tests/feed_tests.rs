/// Feed composition: privacy exclusion, pagination, enrichment and
/// one-level repost resolution
mod common;

use common::{post, private_user, test_context, user};

#[tokio::test]
async fn explore_excludes_private_authors_before_pagination() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = private_user(&ctx, "bob").await;

    post(&ctx, &alice, "public one").await;
    post(&ctx, &alice, "public two").await;
    post(&ctx, &bob, "secret one").await;
    post(&ctx, &bob, "secret two").await;
    post(&ctx, &bob, "secret three").await;

    // Anonymous viewer: totals reflect the filtered set, not post-filtering
    let page = ctx.feed.list_explore(1, 10, None).await.unwrap();
    assert_eq!(page.pagination.total_items, 2);
    assert_eq!(page.items.len(), 2);
    assert!(!page.pagination.has_more);

    // A non-follower sees the same
    let carol = user(&ctx, "carol").await;
    let page = ctx
        .feed
        .list_explore(1, 10, Some(&carol.id))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 2);

    // The author sees their own private content
    let page = ctx.feed.list_explore(1, 10, Some(&bob.id)).await.unwrap();
    assert_eq!(page.pagination.total_items, 5);

    // A pending follow is not enough
    ctx.follows.follow(&carol.id, &bob.id).await.unwrap();
    let page = ctx
        .feed
        .list_explore(1, 10, Some(&carol.id))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 2);

    // An accepted follow opens the content up
    ctx.follows.accept(&bob.id, &carol.id).await.unwrap();
    let page = ctx
        .feed
        .list_explore(1, 10, Some(&carol.id))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 5);
}

#[tokio::test]
async fn explore_pages_are_newest_first() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;

    for i in 0..5 {
        post(&ctx, &alice, &format!("thread {}", i)).await;
    }

    let page = ctx.feed.list_explore(1, 2, None).await.unwrap();
    assert_eq!(page.items[0].content, "thread 4");
    assert_eq!(page.items[1].content, "thread 3");
    assert_eq!(page.pagination.total_pages, 3);
    assert!(page.pagination.has_more);

    let last = ctx.feed.list_explore(3, 2, None).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].content, "thread 0");
    assert!(!last.pagination.has_more);
}

#[tokio::test]
async fn search_is_substring_and_privacy_filtered() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = private_user(&ctx, "bob").await;

    post(&ctx, &alice, "rust is great").await;
    post(&ctx, &alice, "completely unrelated").await;
    post(&ctx, &bob, "rust in private").await;

    let page = ctx.feed.search("rust", 1, 10, None).await.unwrap();
    assert_eq!(page.pagination.total_items, 1);
    assert_eq!(page.items[0].content, "rust is great");

    // LIKE wildcards in the query are literals, not patterns
    let page = ctx.feed.search("%", 1, 10, None).await.unwrap();
    assert_eq!(page.pagination.total_items, 0);
}

#[tokio::test]
async fn followed_feed_is_followed_plus_public() {
    let ctx = test_context().await;
    let viewer = user(&ctx, "viewer").await;
    let pub_author = user(&ctx, "publicfriend").await;
    let followed_private = private_user(&ctx, "closedfriend").await;
    let stranger_private = private_user(&ctx, "stranger").await;

    post(&ctx, &viewer, "mine").await;
    post(&ctx, &pub_author, "public post").await;
    post(&ctx, &followed_private, "for followers").await;
    post(&ctx, &stranger_private, "hidden").await;

    ctx.follows
        .follow(&viewer.id, &followed_private.id)
        .await
        .unwrap();
    ctx.follows
        .accept(&followed_private.id, &viewer.id)
        .await
        .unwrap();

    let page = ctx
        .feed
        .list_followed(1, 10, Some(&viewer.id))
        .await
        .unwrap();
    let contents: Vec<&str> = page.items.iter().map(|t| t.content.as_str()).collect();

    assert!(contents.contains(&"mine"));
    assert!(contents.contains(&"public post"));
    assert!(contents.contains(&"for followers"));
    assert!(!contents.contains(&"hidden"));

    // Without a viewer the followed feed degrades to explore
    let page = ctx.feed.list_followed(1, 10, None).await.unwrap();
    let contents: Vec<&str> = page.items.iter().map(|t| t.content.as_str()).collect();
    assert!(contents.contains(&"public post"));
    assert!(!contents.contains(&"for followers"));
}

#[tokio::test]
async fn author_feed_is_privacy_gated() {
    let ctx = test_context().await;
    let bob = private_user(&ctx, "bob").await;
    let carol = user(&ctx, "carol").await;
    post(&ctx, &bob, "secret").await;

    let err = ctx
        .feed
        .list_by_author(&bob.id, 1, 10, Some(&carol.id))
        .await
        .unwrap_err();
    assert!(matches!(err, skein::error::SkeinError::Privacy(_)));

    let page = ctx
        .feed
        .list_by_author(&bob.id, 1, 10, Some(&bob.id))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 1);
}

#[tokio::test]
async fn repost_resolves_one_level_with_viewer_state() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;

    let original = post(&ctx, &alice, "the original").await;
    ctx.threads.like_thread(&bob.id, &original.id).await.unwrap();
    let repost = ctx.threads.repost_thread(&bob.id, &original.id).await.unwrap();

    ctx.follows.follow(&bob.id, &alice.id).await.unwrap();

    let page = ctx.feed.list_explore(1, 10, Some(&bob.id)).await.unwrap();

    let repost_view = page.items.iter().find(|t| t.id == repost.id).unwrap();
    let source = repost_view.reposted_from.as_ref().expect("resolved source");
    assert_eq!(source.id, original.id);
    assert_eq!(source.content, "the original");
    assert_eq!(source.likes_count, 1);
    assert_eq!(source.is_liked, Some(true));
    assert_eq!(source.author.username, "alice");
    assert_eq!(source.author.is_following, Some(true));

    // Viewer's own repost records mark both the repost and the original
    assert_eq!(repost_view.is_reposted, Some(true));
    let original_view = page.items.iter().find(|t| t.id == original.id).unwrap();
    assert_eq!(original_view.is_reposted, Some(true));
    assert_eq!(original_view.reposts_count, 1);

    // A third party sees no viewer annotations
    let page = ctx.feed.list_explore(1, 10, None).await.unwrap();
    let anon_view = page.items.iter().find(|t| t.id == repost.id).unwrap();
    assert_eq!(anon_view.is_reposted, None);
    assert_eq!(anon_view.is_liked, None);
}

#[tokio::test]
async fn repost_of_repost_stays_one_level_flat() {
    let ctx = test_context().await;
    let alice = user(&ctx, "alice").await;
    let bob = user(&ctx, "bob").await;
    let carol = user(&ctx, "carol").await;

    let original = post(&ctx, &alice, "the original").await;
    let bob_repost = ctx.threads.repost_thread(&bob.id, &original.id).await.unwrap();

    // Reposting a repost records the ultimate-immediate source, so the new
    // row points straight at the original
    let carol_repost = ctx
        .threads
        .repost_thread(&carol.id, &bob_repost.id)
        .await
        .unwrap();
    assert_eq!(carol_repost.reposted_from.as_deref(), Some(original.id.as_str()));

    let page = ctx.feed.list_explore(1, 10, None).await.unwrap();
    let view = page.items.iter().find(|t| t.id == carol_repost.id).unwrap();
    let source = view.reposted_from.as_ref().unwrap();
    assert_eq!(source.id, original.id);
    // The resolved original is itself never further resolved
    assert!(ctx
        .feed
        .get_thread(&source.id, None)
        .await
        .unwrap()
        .reposted_from
        .is_none());
}

#[tokio::test]
async fn get_thread_surfaces_not_found_and_privacy() {
    let ctx = test_context().await;
    let bob = private_user(&ctx, "bob").await;
    let thread = post(&ctx, &bob, "secret").await;

    let err = ctx.feed.get_thread("missing", None).await.unwrap_err();
    assert!(matches!(err, skein::error::SkeinError::NotFound(_)));

    let err = ctx.feed.get_thread(&thread.id, None).await.unwrap_err();
    assert!(matches!(err, skein::error::SkeinError::Privacy(_)));

    let view = ctx
        .feed
        .get_thread(&thread.id, Some(&bob.id))
        .await
        .unwrap();
    assert_eq!(view.content, "secret");
}
