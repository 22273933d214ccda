use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use agora_domain::DomainResult;
use agora_domain::detail::PostDetailService;
use agora_domain::engagement::{
    EngagementService, Like, LikeKey, LikeTarget, TargetType, ToggleOutcome,
};
use agora_domain::error::DomainError;
use agora_domain::identity::ActorIdentity;
use agora_domain::karma::{KarmaEvent, KarmaLedgerService, KarmaReason};
use agora_domain::leaderboard::LeaderboardService;
use agora_domain::ports::BoxFuture;
use agora_domain::ports::engagement::EngagementRepository;
use agora_domain::threads::{CommentCreate, MAX_COMMENT_DEPTH, PostCreate, ThreadService};
use agora_infra::repositories::InMemoryCommunityStore;
use futures_util::future::join_all;

struct Harness {
    store: InMemoryCommunityStore,
    threads: ThreadService,
    engagement: EngagementService,
    karma: KarmaLedgerService,
    leaderboard: LeaderboardService,
}

fn harness() -> Harness {
    let store = InMemoryCommunityStore::new();
    let shared = Arc::new(store.clone());
    Harness {
        threads: ThreadService::new(shared.clone()),
        engagement: EngagementService::new(shared.clone()),
        karma: KarmaLedgerService::new(shared.clone()),
        leaderboard: LeaderboardService::new(shared),
        store,
    }
}

fn alice() -> ActorIdentity {
    ActorIdentity::new("user-a", "alice")
}

fn bob() -> ActorIdentity {
    ActorIdentity::new("user-b", "bob")
}

fn carol() -> ActorIdentity {
    ActorIdentity::new("user-c", "carol")
}

async fn post_by(harness: &Harness, author: &ActorIdentity) -> i64 {
    harness
        .threads
        .create_post(
            author,
            PostCreate {
                content: "first post".to_string(),
            },
        )
        .await
        .expect("create post")
        .post_id
}

async fn reply(harness: &Harness, post_id: i64, parent_id: Option<i64>) -> i64 {
    harness
        .threads
        .create_comment(
            &bob(),
            CommentCreate {
                post_id,
                parent_id,
                content: "reply".to_string(),
            },
        )
        .await
        .expect("create comment")
        .comment_id
}

#[tokio::test]
async fn nested_replies_carry_materialized_paths() {
    let harness = harness();
    let post_id = post_by(&harness, &alice()).await;

    let root = reply(&harness, post_id, None).await;
    let child = reply(&harness, post_id, Some(root)).await;
    let grandchild = reply(&harness, post_id, Some(child)).await;

    let thread = harness.threads.list_thread(post_id).await.expect("thread");
    let paths: Vec<(&str, u32)> = thread
        .iter()
        .map(|comment| (comment.path.as_str(), comment.depth))
        .collect();
    let expected_root = root.to_string();
    let expected_child = format!("{root}.{child}");
    let expected_grandchild = format!("{root}.{child}.{grandchild}");
    assert_eq!(
        paths,
        vec![
            (expected_root.as_str(), 0),
            (expected_child.as_str(), 1),
            (expected_grandchild.as_str(), 2),
        ]
    );
}

#[tokio::test]
async fn reply_to_comment_of_another_post_is_not_found() {
    let harness = harness();
    let first = post_by(&harness, &alice()).await;
    let second = post_by(&harness, &alice()).await;
    let foreign_parent = reply(&harness, first, None).await;

    let err = harness
        .threads
        .create_comment(
            &bob(),
            CommentCreate {
                post_id: second,
                parent_id: Some(foreign_parent),
                content: "lost".to_string(),
            },
        )
        .await
        .expect_err("parent belongs to another post");
    assert!(matches!(err, DomainError::NotFound));

    let err = harness
        .threads
        .create_comment(
            &bob(),
            CommentCreate {
                post_id: 999,
                parent_id: None,
                content: "orphan".to_string(),
            },
        )
        .await
        .expect_err("post does not exist");
    assert!(matches!(err, DomainError::NotFound));
}

#[tokio::test]
async fn reply_chains_stop_at_the_depth_cap_and_still_render() {
    let harness = harness();
    let post_id = post_by(&harness, &alice()).await;

    let mut parent = reply(&harness, post_id, None).await;
    for _ in 0..MAX_COMMENT_DEPTH {
        parent = reply(&harness, post_id, Some(parent)).await;
    }

    let err = harness
        .threads
        .create_comment(
            &bob(),
            CommentCreate {
                post_id,
                parent_id: Some(parent),
                content: "too deep".to_string(),
            },
        )
        .await
        .expect_err("reply below the cap");
    assert!(matches!(err, DomainError::Validation(_)));

    let details = PostDetailService::new(harness.threads.clone(), harness.engagement.clone());
    let detail = details.load(post_id, None).await.expect("detail");
    assert_eq!(detail.comment_count, MAX_COMMENT_DEPTH as usize + 1);

    let mut deepest = 0;
    let mut level = &detail.comments;
    while let Some(node) = level.first() {
        deepest = node.comment.depth;
        level = &node.children;
    }
    assert_eq!(deepest, MAX_COMMENT_DEPTH);
}

#[tokio::test]
async fn like_awards_author_and_unlike_reverses_exactly() {
    let harness = harness();
    let post_id = post_by(&harness, &bob()).await;

    let liked = harness
        .engagement
        .toggle_like(&alice(), "post", post_id)
        .await
        .expect("like");
    assert!(liked.is_liked);
    assert_eq!(liked.like_count, 1);
    assert_eq!(liked.outcome, ToggleOutcome::Liked);

    let key = LikeKey::new("user-a", TargetType::Post, post_id).karma_key();
    let event = harness
        .karma
        .get_event(&key)
        .await
        .expect("get event")
        .expect("award recorded");
    assert_eq!(event.beneficiary_id, "user-b");
    assert_eq!(event.amount, 5);
    assert_eq!(event.reason, KarmaReason::PostLike);

    // Another user's like on the same post must survive alice's unlike.
    harness
        .engagement
        .toggle_like(&carol(), "post", post_id)
        .await
        .expect("carol likes");
    assert_eq!(harness.karma.balance("user-b").await.expect("balance"), 10);

    let unliked = harness
        .engagement
        .toggle_like(&alice(), "post", post_id)
        .await
        .expect("unlike");
    assert!(!unliked.is_liked);
    assert_eq!(unliked.like_count, 1);
    assert_eq!(unliked.outcome, ToggleOutcome::Unliked);

    assert!(harness.karma.get_event(&key).await.expect("get").is_none());
    let carol_key = LikeKey::new("user-c", TargetType::Post, post_id).karma_key();
    assert!(harness.karma.get_event(&carol_key).await.expect("get").is_some());
    assert_eq!(harness.karma.balance("user-b").await.expect("balance"), 5);
}

#[tokio::test]
async fn comment_likes_pay_one_point() {
    let harness = harness();
    let post_id = post_by(&harness, &alice()).await;
    let comment_id = reply(&harness, post_id, None).await;

    let liked = harness
        .engagement
        .toggle_like(&alice(), "comment", comment_id)
        .await
        .expect("like comment");
    assert!(liked.is_liked);
    assert_eq!(harness.karma.balance("user-b").await.expect("balance"), 1);
}

#[tokio::test]
async fn toggle_rejects_unknown_kinds_and_missing_targets() {
    let harness = harness();

    let err = harness
        .engagement
        .toggle_like(&alice(), "story", 1)
        .await
        .expect_err("bad target type");
    assert!(matches!(err, DomainError::Validation(_)));

    let err = harness
        .engagement
        .toggle_like(&alice(), "post", 404)
        .await
        .expect_err("missing post");
    assert!(matches!(err, DomainError::NotFound));
    assert_eq!(harness.store.karma_event_count().await, 0);
}

/// Engagement port whose first `stale` like reads miss an existing like, so those
/// toggles take the insert branch the way a request that raced another one would.
struct StaleLikeReads {
    store: InMemoryCommunityStore,
    stale: AtomicUsize,
}

impl StaleLikeReads {
    fn new(store: InMemoryCommunityStore, stale: usize) -> Self {
        Self {
            store,
            stale: AtomicUsize::new(stale),
        }
    }
}

impl EngagementRepository for StaleLikeReads {
    fn get_target(
        &self,
        target_type: TargetType,
        target_id: i64,
    ) -> BoxFuture<'_, DomainResult<Option<LikeTarget>>> {
        self.store.get_target(target_type, target_id)
    }

    fn get_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<Like>>> {
        let missed = self
            .stale
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if missed {
            return Box::pin(async { Ok(None) });
        }
        self.store.get_like(key)
    }

    fn insert_like(&self, like: &Like, award: &KarmaEvent) -> BoxFuture<'_, DomainResult<i64>> {
        self.store.insert_like(like, award)
    }

    fn delete_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<i64>>> {
        self.store.delete_like(key)
    }

    fn liked_target_ids(
        &self,
        user_id: &str,
        target_type: TargetType,
        target_ids: &[i64],
    ) -> BoxFuture<'_, DomainResult<Vec<i64>>> {
        self.store.liked_target_ids(user_id, target_type, target_ids)
    }
}

/// Engagement port whose inserts report a uniqueness conflict without writing anything,
/// like a storage transaction that was rolled back for an unrelated reason.
struct RolledBackInserts(InMemoryCommunityStore);

impl EngagementRepository for RolledBackInserts {
    fn get_target(
        &self,
        target_type: TargetType,
        target_id: i64,
    ) -> BoxFuture<'_, DomainResult<Option<LikeTarget>>> {
        self.0.get_target(target_type, target_id)
    }

    fn get_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<Like>>> {
        self.0.get_like(key)
    }

    fn insert_like(&self, _like: &Like, _award: &KarmaEvent) -> BoxFuture<'_, DomainResult<i64>> {
        Box::pin(async { Err(DomainError::Conflict) })
    }

    fn delete_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<i64>>> {
        self.0.delete_like(key)
    }

    fn liked_target_ids(
        &self,
        user_id: &str,
        target_type: TargetType,
        target_ids: &[i64],
    ) -> BoxFuture<'_, DomainResult<Vec<i64>>> {
        self.0.liked_target_ids(user_id, target_type, target_ids)
    }
}

#[tokio::test]
async fn racing_like_that_loses_the_insert_reports_winner_state() {
    let harness = harness();
    let post_id = post_by(&harness, &bob()).await;
    // Both toggles decide from a read that misses the like; the loser's follow-up read
    // sees the winner's row.
    let racer = EngagementService::new(Arc::new(StaleLikeReads::new(harness.store.clone(), 2)));

    let winner = racer
        .toggle_like(&alice(), "post", post_id)
        .await
        .expect("winner");
    let loser = racer
        .toggle_like(&alice(), "post", post_id)
        .await
        .expect("loser");

    assert_eq!(winner.outcome, ToggleOutcome::Liked);
    assert_eq!(loser.outcome, ToggleOutcome::AlreadyLiked);
    assert!(loser.is_liked);
    assert_eq!(loser.like_count, 1);

    let post = harness.threads.get_post(post_id).await.expect("post");
    assert_eq!(post.like_count, 1);
    assert_eq!(harness.store.live_like_rows(TargetType::Post, post_id).await, 1);
    assert_eq!(harness.store.karma_event_count().await, 1);
}

#[tokio::test]
async fn conflict_without_a_like_row_is_not_reported_as_liked() {
    let harness = harness();
    let post_id = post_by(&harness, &bob()).await;
    let engagement = EngagementService::new(Arc::new(RolledBackInserts(harness.store.clone())));

    let err = engagement
        .toggle_like(&alice(), "post", post_id)
        .await
        .expect_err("rolled back insert");

    assert!(matches!(err, DomainError::Integrity(_)));
    let post = harness.threads.get_post(post_id).await.expect("post");
    assert_eq!(post.like_count, 0);
    assert_eq!(harness.store.live_like_rows(TargetType::Post, post_id).await, 0);
    assert_eq!(harness.store.karma_event_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_toggles_by_one_user_keep_row_count_and_ledger_in_step() {
    let harness = harness();
    let post_id = post_by(&harness, &bob()).await;

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let engagement = harness.engagement.clone();
            tokio::spawn(async move { engagement.toggle_like(&alice(), "post", post_id).await })
        })
        .collect();

    for task in tasks {
        // A toggle whose conflicting insert was undone by a later unlike before the
        // re-read rolls back as an integrity error; it must still leave nothing behind.
        match task.await.expect("join") {
            Ok(_) | Err(DomainError::Integrity(_)) => {}
            Err(err) => panic!("unexpected toggle error: {err:?}"),
        }
    }

    let rows = harness.store.live_like_rows(TargetType::Post, post_id).await;
    let post = harness.threads.get_post(post_id).await.expect("post");
    assert!(rows <= 1);
    assert_eq!(post.like_count, rows as i64);
    assert_eq!(harness.store.karma_event_count().await, rows);
    assert_eq!(
        harness.karma.balance("user-b").await.expect("balance"),
        5 * rows as i64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_likes_from_many_users_all_land() {
    let harness = harness();
    let post_id = post_by(&harness, &bob()).await;
    let likers: Vec<ActorIdentity> = (0..16)
        .map(|idx| ActorIdentity::new(format!("liker-{idx}"), format!("liker{idx}")))
        .collect();

    let results = join_all(
        likers
            .iter()
            .map(|actor| harness.engagement.toggle_like(actor, "post", post_id)),
    )
    .await;

    assert!(results.iter().all(|result| matches!(
        result,
        Ok(toggle) if toggle.is_liked && toggle.outcome == ToggleOutcome::Liked
    )));
    let post = harness.threads.get_post(post_id).await.expect("post");
    assert_eq!(post.like_count, 16);
    assert_eq!(harness.karma.balance("user-b").await.expect("balance"), 80);
}

#[tokio::test]
async fn sequential_toggles_follow_parity_and_ledger_mirrors_likes() {
    let harness = harness();
    let post_id = post_by(&harness, &bob()).await;
    let key = LikeKey::new("user-a", TargetType::Post, post_id);

    for round in 1..=7 {
        let toggle = harness
            .engagement
            .toggle_like(&alice(), "post", post_id)
            .await
            .expect("toggle");
        let expect_liked = round % 2 == 1;
        assert_eq!(toggle.is_liked, expect_liked);
        assert_eq!(toggle.like_count, i64::from(expect_liked));
        assert!(toggle.like_count >= 0);

        let event = harness.karma.get_event(&key.karma_key()).await.expect("get");
        assert_eq!(event.is_some(), expect_liked);
        assert_eq!(
            harness.engagement.is_liked(&key).await.expect("is liked"),
            expect_liked
        );
    }
}

#[tokio::test]
async fn leaderboard_sums_recent_awards() {
    let harness = harness();
    let bob_post = post_by(&harness, &bob()).await;
    let carol_post = post_by(&harness, &carol()).await;
    let bob_comment = reply(&harness, carol_post, None).await;

    harness
        .engagement
        .toggle_like(&alice(), "post", bob_post)
        .await
        .expect("like bob post");
    harness
        .engagement
        .toggle_like(&alice(), "comment", bob_comment)
        .await
        .expect("like bob comment");
    harness
        .engagement
        .toggle_like(&alice(), "post", carol_post)
        .await
        .expect("like carol post");

    let top = harness.leaderboard.top_karma(24, 5).await.expect("top");
    let ranked: Vec<(&str, &str, i64)> = top
        .iter()
        .map(|entry| (entry.user_id.as_str(), entry.username.as_str(), entry.karma))
        .collect();
    assert_eq!(
        ranked,
        vec![("user-b", "bob", 6), ("user-c", "carol", 5)]
    );

    assert!(harness.leaderboard.top_karma(0, 5).await.expect("zero window").is_empty());
    assert!(harness.leaderboard.top_karma(24, 0).await.expect("zero k").is_empty());
}

#[tokio::test]
async fn post_detail_nests_thread_and_flags_viewer_likes() {
    let harness = harness();
    let post_id = post_by(&harness, &alice()).await;
    let root = reply(&harness, post_id, None).await;
    let child = reply(&harness, post_id, Some(root)).await;
    let second_root = reply(&harness, post_id, None).await;

    harness
        .engagement
        .toggle_like(&carol(), "comment", child)
        .await
        .expect("like child");
    harness
        .engagement
        .toggle_like(&carol(), "post", post_id)
        .await
        .expect("like post");

    let details = PostDetailService::new(harness.threads.clone(), harness.engagement.clone());

    let viewer = carol();
    let detail = details.load(post_id, Some(&viewer)).await.expect("detail");
    assert!(detail.is_liked);
    assert_eq!(detail.post.like_count, 1);
    assert_eq!(detail.comment_count, 3);
    let roots: Vec<i64> = detail
        .comments
        .iter()
        .map(|node| node.comment.comment_id)
        .collect();
    assert_eq!(roots, vec![root, second_root]);
    let nested = &detail.comments[0].children[0];
    assert_eq!(nested.comment.comment_id, child);
    assert!(nested.is_liked);
    assert!(!detail.comments[0].is_liked);

    let anonymous = details.load(post_id, None).await.expect("anonymous detail");
    assert!(!anonymous.is_liked);
    assert!(!anonymous.comments[0].children[0].is_liked);
}
