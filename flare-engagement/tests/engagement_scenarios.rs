use std::sync::Arc;

use serde_json::json;

use flare_engagement::application::commands::{
    AddCommentCommand, CreatePostCommand, PurchasePostCommand, ToggleFollowCommand,
    ToggleLikeCommand,
};
use flare_engagement::application::queries::{FeedQuery, HashtagQuery, ProfileQuery};
use flare_engagement::domain::model::ImageUpload;
use flare_engagement::{ApplicationBootstrap, ApplicationContext, PostRef, PremiumAccess, PremiumPostRef};
use flare_social_core::backend::{Filter, InMemoryBackend, row_i64, row_str};
use flare_social_core::optimistic::{ToggleState, ViewCell};
use flare_social_core::{AuthSession, CommandFeedback, ErrorCode, FlareSocialConfig, SessionContext};

const VIEWER: &str = "u-viewer";
const OWNER: &str = "u-owner";

struct Harness {
    context: ApplicationContext,
    backend: Arc<InMemoryBackend>,
    session: Arc<SessionContext>,
}

async fn harness(viewer_points: i64) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let session = Arc::new(SessionContext::signed_in(
        AuthSession::new(VIEWER, "ayse").with_points(viewer_points),
    ));
    let (context, backend) =
        ApplicationBootstrap::in_memory(&FlareSocialConfig::default(), session.clone())
            .await
            .unwrap();

    backend
        .seed("profiles", json!({"id": VIEWER, "username": "ayse", "points": viewer_points}))
        .await;
    backend
        .seed("profiles", json!({"id": OWNER, "username": "mehmet", "points": 0}))
        .await;
    backend
        .seed(
            "posts",
            json!({"id": "p1", "user_id": OWNER, "content": "sunset #travel", "hashtags": ["travel"], "likes_count": 5, "comments_count": 0}),
        )
        .await;
    backend
        .seed(
            "posts",
            json!({"id": "p-premium", "user_id": OWNER, "content": "recipe", "likes_count": 0, "is_premium": true, "price": 50}),
        )
        .await;

    Harness {
        context,
        backend,
        session,
    }
}

impl Harness {
    async fn points(&self, user_id: &str) -> i64 {
        self.backend
            .find("profiles", user_id)
            .await
            .and_then(|row| row_i64(&row, "points"))
            .unwrap_or_default()
    }

    async fn notifications(&self, user_id: &str, kind: &str) -> usize {
        self.backend
            .count(
                "notifications",
                &[Filter::eq("user_id", user_id), Filter::eq("type", kind)],
            )
            .await
    }

    fn post_ref() -> PostRef {
        PostRef {
            id: "p1".into(),
            owner_id: OWNER.into(),
        }
    }
}

#[tokio::test]
async fn test_like_applies_count_and_rewards_owner() {
    let h = harness(0).await;
    let state = ViewCell::new(ToggleState::new(false, 5));

    let feedback = h
        .context
        .command_handler
        .handle_toggle_like(ToggleLikeCommand {
            post: Harness::post_ref(),
            state: state.clone(),
        })
        .await;

    assert_eq!(feedback, CommandFeedback::Done(ToggleState::new(true, 6)));
    assert_eq!(state.snapshot().await, ToggleState::new(true, 6));
    assert_eq!(
        h.backend
            .count("likes", &[Filter::eq("post_id", "p1"), Filter::eq("user_id", VIEWER)])
            .await,
        1
    );
    assert_eq!(h.points(OWNER).await, 2);
    let ledger = h.backend.rows("point_transactions").await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(row_str(&ledger[0], "reason"), Some("like_received"));
    assert_eq!(h.notifications(OWNER, "like").await, 1);
}

#[tokio::test]
async fn test_bootstrap_from_shipped_config_directory() {
    let config_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../config");
    let session = Arc::new(SessionContext::signed_in(AuthSession::new(VIEWER, "ayse")));
    let (context, backend) =
        ApplicationBootstrap::in_memory_from_path(&config_dir, Some("development"), session)
            .await
            .unwrap();
    backend
        .seed("profiles", json!({"id": VIEWER, "username": "ayse", "points": 0}))
        .await;
    backend
        .seed("profiles", json!({"id": OWNER, "username": "mehmet", "points": 0}))
        .await;
    backend
        .seed("posts", json!({"id": "p1", "user_id": OWNER, "content": "hi", "likes_count": 0}))
        .await;

    let feedback = context
        .command_handler
        .handle_toggle_like(ToggleLikeCommand {
            post: Harness::post_ref(),
            state: ViewCell::new(ToggleState::new(false, 0)),
        })
        .await;

    assert_eq!(feedback, CommandFeedback::Done(ToggleState::new(true, 1)));
    let owner = backend.find("profiles", OWNER).await.unwrap();
    assert_eq!(row_i64(&owner, "points"), Some(2));
}

#[tokio::test]
async fn test_bootstrap_from_missing_path_fails() {
    let session = Arc::new(SessionContext::signed_in(AuthSession::new(VIEWER, "ayse")));
    let result = ApplicationBootstrap::in_memory_from_path(
        std::path::Path::new("does/not/exist"),
        None,
        session,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_failed_counter_rolls_back_without_side_effects() {
    let h = harness(0).await;
    h.backend.fail_next("rpc:adjust_counter");
    let state = ViewCell::new(ToggleState::new(false, 5));

    let feedback = h
        .context
        .command_handler
        .handle_toggle_like(ToggleLikeCommand {
            post: Harness::post_ref(),
            state: state.clone(),
        })
        .await;

    assert_eq!(feedback.error_code(), Some(ErrorCode::ProcedureFailed));
    assert_eq!(state.snapshot().await, ToggleState::new(false, 5));
    assert_eq!(h.backend.rows("likes").await.len(), 0);
    assert_eq!(h.points(OWNER).await, 0);
    assert!(h.backend.rows("point_transactions").await.is_empty());
    assert_eq!(h.notifications(OWNER, "like").await, 0);
}

#[tokio::test]
async fn test_unlike_revokes_reward_and_notification() {
    let h = harness(0).await;
    let state = ViewCell::new(ToggleState::new(false, 5));
    let command = ToggleLikeCommand {
        post: Harness::post_ref(),
        state: state.clone(),
    };

    assert!(h.context.command_handler.handle_toggle_like(command.clone()).await.is_done());
    let feedback = h.context.command_handler.handle_toggle_like(command).await;

    assert_eq!(feedback, CommandFeedback::Done(ToggleState::new(false, 5)));
    assert_eq!(h.points(OWNER).await, 0);
    assert_eq!(h.notifications(OWNER, "like").await, 0);
}

#[tokio::test]
async fn test_comment_is_confirmed_and_rewards_both_sides() {
    let h = harness(0).await;
    let comments = ViewCell::new(Vec::new());

    let feedback = h
        .context
        .command_handler
        .handle_add_comment(AddCommentCommand {
            post: Harness::post_ref(),
            content: "  Hello #world ".into(),
            comments: comments.clone(),
        })
        .await;

    let saved = feedback.into_done().unwrap();
    let list = comments.snapshot().await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, saved.id);
    assert!(!flare_social_core::utils::is_temp_id(&saved.id));
    assert_eq!(saved.content, "Hello #world");
    assert_eq!(saved.hashtags, vec!["world".to_string()]);
    assert!(saved.created_at.is_some());
    assert_eq!(saved.author.as_ref().map(|a| a.username.as_str()), Some("ayse"));

    assert_eq!(h.points(VIEWER).await, 1);
    assert_eq!(h.points(OWNER).await, 2);
    assert_eq!(h.notifications(OWNER, "comment").await, 1);
    let post = h.backend.find("posts", "p1").await.unwrap();
    assert_eq!(row_i64(&post, "comments_count"), Some(1));
}

#[tokio::test]
async fn test_comment_reward_retry_does_not_pay_commenter_twice() {
    let h = harness(0).await;
    h.backend
        .seed(
            "posts",
            json!({"id": "p-ghost", "user_id": "u-ghost", "content": "draft", "likes_count": 0, "comments_count": 0}),
        )
        .await;

    let feedback = h
        .context
        .command_handler
        .handle_add_comment(AddCommentCommand {
            post: PostRef {
                id: "p-ghost".into(),
                owner_id: "u-ghost".into(),
            },
            content: "first".into(),
            comments: ViewCell::new(Vec::new()),
        })
        .await;

    assert!(feedback.is_done());
    assert_eq!(h.points(VIEWER).await, 1);
    assert!(!h.context.enrichment.outbox().is_empty().await);

    h.backend
        .seed("profiles", json!({"id": "u-ghost", "username": "ghost", "points": 0}))
        .await;
    let report = h.context.enrichment.retry_outbox().await;

    assert!(report.completed.iter().any(|name| &**name == "reward_points"));
    assert_eq!(h.points(VIEWER).await, 1);
    assert_eq!(h.points("u-ghost").await, 2);
    let ledger = h.backend.rows("point_transactions").await;
    assert_eq!(
        ledger
            .iter()
            .filter(|row| row_str(row, "reason") == Some("comment_written"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_failed_comment_insert_restores_list() {
    let h = harness(0).await;
    h.backend.fail_next("insert:comments");
    let comments = ViewCell::new(Vec::new());

    let feedback = h
        .context
        .command_handler
        .handle_add_comment(AddCommentCommand {
            post: Harness::post_ref(),
            content: "Hello".into(),
            comments: comments.clone(),
        })
        .await;

    assert_eq!(feedback.error_code(), Some(ErrorCode::RemoteWriteFailed));
    assert!(comments.snapshot().await.is_empty());
    assert_eq!(h.points(VIEWER).await, 0);
}

#[tokio::test]
async fn test_blank_comment_is_rejected_locally() {
    let h = harness(0).await;
    let comments = ViewCell::new(Vec::new());

    let feedback = h
        .context
        .command_handler
        .handle_add_comment(AddCommentCommand {
            post: Harness::post_ref(),
            content: "   ".into(),
            comments: comments.clone(),
        })
        .await;

    assert_eq!(feedback.error_code(), Some(ErrorCode::InvalidArgument));
    assert!(h.backend.rows("comments").await.is_empty());
}

#[tokio::test]
async fn test_purchase_with_insufficient_balance_is_rejected_before_remote_call() {
    let h = harness(40).await;
    let access = ViewCell::new(PremiumAccess {
        unlocked: false,
        balance: 40,
    });

    let feedback = h
        .context
        .command_handler
        .handle_purchase(PurchasePostCommand {
            post: PremiumPostRef {
                id: "p-premium".into(),
                owner_id: OWNER.into(),
                price: 50,
            },
            access: access.clone(),
        })
        .await;

    assert_eq!(feedback.error_code(), Some(ErrorCode::InsufficientPoints));
    let message = feedback.error_message().unwrap();
    assert!(message.contains("40") && message.contains("50"), "{message}");
    assert!(h.backend.rows("post_purchases").await.is_empty());
    assert!(h.backend.rows("point_transactions").await.is_empty());
    assert_eq!(h.points(VIEWER).await, 40);
    assert_eq!(access.snapshot().await, PremiumAccess { unlocked: false, balance: 40 });
}

#[tokio::test]
async fn test_purchase_transfers_points_and_refreshes_session() {
    let h = harness(120).await;
    let access = ViewCell::new(PremiumAccess {
        unlocked: false,
        balance: 120,
    });

    let feedback = h
        .context
        .command_handler
        .handle_purchase(PurchasePostCommand {
            post: PremiumPostRef {
                id: "p-premium".into(),
                owner_id: OWNER.into(),
                price: 50,
            },
            access: access.clone(),
        })
        .await;

    assert_eq!(feedback, CommandFeedback::Done(70));
    assert_eq!(access.snapshot().await, PremiumAccess { unlocked: true, balance: 70 });
    assert_eq!(h.session.current().await.unwrap().points, 70);
    assert_eq!(h.points(OWNER).await, 50);
    assert_eq!(h.notifications(OWNER, "purchase").await, 1);
}

#[tokio::test]
async fn test_rejected_purchase_receipt_rolls_back_unlock() {
    let h = harness(120).await;
    h.backend
        .seed("post_purchases", json!({"post_id": "p-premium", "buyer_id": VIEWER}))
        .await;
    let access = ViewCell::new(PremiumAccess {
        unlocked: false,
        balance: 120,
    });

    let feedback = h
        .context
        .command_handler
        .handle_purchase(PurchasePostCommand {
            post: PremiumPostRef {
                id: "p-premium".into(),
                owner_id: OWNER.into(),
                price: 50,
            },
            access: access.clone(),
        })
        .await;

    assert_eq!(feedback.error_code(), Some(ErrorCode::ProcedureFailed));
    assert_eq!(access.snapshot().await, PremiumAccess { unlocked: false, balance: 120 });
    assert_eq!(h.points(VIEWER).await, 120);
}

#[tokio::test]
async fn test_follow_updates_both_counters_and_notifies() {
    let h = harness(0).await;
    let state = ViewCell::new(ToggleState::new(false, 0));

    let feedback = h
        .context
        .command_handler
        .handle_toggle_follow(ToggleFollowCommand {
            profile_id: OWNER.into(),
            state: state.clone(),
        })
        .await;

    assert_eq!(feedback, CommandFeedback::Done(ToggleState::new(true, 1)));
    let owner = h.backend.find("profiles", OWNER).await.unwrap();
    let viewer = h.backend.find("profiles", VIEWER).await.unwrap();
    assert_eq!(row_i64(&owner, "followers_count"), Some(1));
    assert_eq!(row_i64(&viewer, "following_count"), Some(1));
    assert_eq!(h.notifications(OWNER, "follow").await, 1);

    let view = h
        .context
        .query_handler
        .handle_profile(ProfileQuery {
            user_id: OWNER.into(),
        })
        .await
        .into_done()
        .unwrap();
    assert!(view.is_following);
    assert_eq!(view.level.tier.level, 1);
}

#[tokio::test]
async fn test_self_follow_is_rejected() {
    let h = harness(0).await;
    let state = ViewCell::new(ToggleState::new(false, 3));

    let feedback = h
        .context
        .command_handler
        .handle_toggle_follow(ToggleFollowCommand {
            profile_id: VIEWER.into(),
            state: state.clone(),
        })
        .await;

    assert_eq!(feedback.error_code(), Some(ErrorCode::InvalidArgument));
    assert_eq!(state.snapshot().await, ToggleState::new(false, 3));
    assert!(h.backend.rows("follows").await.is_empty());
}

#[tokio::test]
async fn test_feed_reports_like_and_unlock_state() {
    let h = harness(0).await;
    h.context
        .command_handler
        .handle_toggle_like(ToggleLikeCommand {
            post: Harness::post_ref(),
            state: ViewCell::new(ToggleState::new(false, 5)),
        })
        .await;

    let items = h
        .context
        .query_handler
        .handle_feed(FeedQuery { page: 0 })
        .await
        .into_done()
        .unwrap();

    assert_eq!(items.len(), 2);
    let free = items.iter().find(|item| item.post.id == "p1").unwrap();
    assert!(free.liked && free.unlocked);
    assert_eq!(free.post.likes_count, 6);
    assert_eq!(free.post.author.as_ref().map(|a| a.username.as_str()), Some("mehmet"));
    let premium = items.iter().find(|item| item.post.id == "p-premium").unwrap();
    assert!(!premium.liked && !premium.unlocked);
}

#[tokio::test]
async fn test_feed_defaults_to_not_liked_when_like_read_fails() {
    let h = harness(0).await;
    h.backend
        .seed("likes", json!({"post_id": "p1", "user_id": VIEWER}))
        .await;
    h.backend.fail_next("select:likes");

    let items = h
        .context
        .query_handler
        .handle_feed(FeedQuery { page: 0 })
        .await
        .into_done()
        .unwrap();

    assert!(items.iter().all(|item| !item.liked));
}

#[tokio::test]
async fn test_created_post_uploads_image_and_awards_points() {
    let h = harness(0).await;

    let post = h
        .context
        .command_handler
        .handle_create_post(CreatePostCommand {
            content: "New #Rust post".into(),
            image: Some(ImageUpload {
                bytes: vec![1, 2, 3],
                content_type: "image/png".into(),
                extension: "png".into(),
            }),
            price: None,
        })
        .await
        .into_done()
        .unwrap();

    assert_eq!(post.hashtags, vec!["rust".to_string()]);
    let url = post.image_url.unwrap();
    assert!(url.contains("/post-images/u-viewer/"), "{url}");
    assert_eq!(h.points(VIEWER).await, 5);

    let found = h
        .context
        .query_handler
        .handle_hashtag(HashtagQuery { tag: "#rust".into() })
        .await
        .into_done()
        .unwrap();
    assert_eq!(found.len(), 1);
}
