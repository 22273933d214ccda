use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use agora_domain::DomainResult;
use agora_domain::engagement::{Like, LikeKey, LikeTarget, TargetType};
use agora_domain::error::DomainError;
use agora_domain::karma::{KarmaEvent, KarmaKey};
use agora_domain::ports::BoxFuture;
use agora_domain::ports::engagement::EngagementRepository;
use agora_domain::ports::karma::KarmaLedgerRepository;
use agora_domain::ports::threads::ThreadRepository;
use agora_domain::threads::{Comment, Post, compare_thread_order};
use tokio::sync::RwLock;

#[derive(Default)]
struct CommunityState {
    last_post_id: i64,
    last_comment_id: i64,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    comments_by_post: HashMap<i64, Vec<i64>>,
    likes: HashMap<LikeKey, Like>,
    karma: HashMap<KarmaKey, KarmaEvent>,
}

impl CommunityState {
    fn like_count_mut(&mut self, target_type: TargetType, target_id: i64) -> Option<&mut i64> {
        match target_type {
            TargetType::Post => self.posts.get_mut(&target_id).map(|post| &mut post.like_count),
            TargetType::Comment => self
                .comments
                .get_mut(&target_id)
                .map(|comment| &mut comment.like_count),
        }
    }

    fn target(&self, target_type: TargetType, target_id: i64) -> Option<LikeTarget> {
        let (author_id, author_username, like_count) = match target_type {
            TargetType::Post => self.posts.get(&target_id).map(|post| {
                (&post.author_id, &post.author_username, post.like_count)
            })?,
            TargetType::Comment => self.comments.get(&target_id).map(|comment| {
                (&comment.author_id, &comment.author_username, comment.like_count)
            })?,
        };
        Some(LikeTarget {
            target_type,
            target_id,
            author_id: author_id.clone(),
            author_username: author_username.clone(),
            like_count,
        })
    }

    fn append_award(&mut self, event: &KarmaEvent) -> DomainResult<()> {
        let key = event.key();
        if self.karma.contains_key(&key) {
            return Err(DomainError::Conflict);
        }
        self.karma.insert(key, event.clone());
        Ok(())
    }

    fn remove_award(&mut self, key: &KarmaKey) -> bool {
        self.karma.remove(key).is_some()
    }
}

/// Process-local implementation of every community port.
///
/// One `RwLock` guards the whole dataset; each mutating call validates under the write
/// guard before touching anything, so a failed call leaves no partial state and a
/// successful one is observed all at once.
///
/// The single lock also serializes writes to unrelated posts and comments, so this
/// backend does not give per-target write isolation. Use the SurrealDB store when
/// independent targets must not contend.
#[derive(Clone, Default)]
pub struct InMemoryCommunityStore {
    state: Arc<RwLock<CommunityState>>,
}

impl InMemoryCommunityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live likes on a target, counted from the like rows themselves.
    pub async fn live_like_rows(&self, target_type: TargetType, target_id: i64) -> usize {
        self.state
            .read()
            .await
            .likes
            .keys()
            .filter(|key| key.target_type == target_type && key.target_id == target_id)
            .count()
    }

    pub async fn karma_event_count(&self) -> usize {
        self.state.read().await.karma.len()
    }
}

impl ThreadRepository for InMemoryCommunityStore {
    fn reserve_post_id(&self) -> BoxFuture<'_, DomainResult<i64>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.last_post_id += 1;
            Ok(state.last_post_id)
        })
    }

    fn create_post(&self, post: &Post) -> BoxFuture<'_, DomainResult<Post>> {
        let post = post.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.posts.contains_key(&post.post_id) {
                return Err(DomainError::Conflict);
            }
            state.posts.insert(post.post_id, post.clone());
            Ok(post)
        })
    }

    fn get_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<Option<Post>>> {
        Box::pin(async move { Ok(self.state.read().await.posts.get(&post_id).cloned()) })
    }

    fn list_posts(&self, limit: usize) -> BoxFuture<'_, DomainResult<Vec<Post>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut posts: Vec<Post> = state.posts.values().cloned().collect();
            posts.sort_by(|a, b| {
                b.created_at_ms
                    .cmp(&a.created_at_ms)
                    .then_with(|| b.post_id.cmp(&a.post_id))
            });
            posts.truncate(limit);
            Ok(posts)
        })
    }

    fn reserve_comment_id(&self) -> BoxFuture<'_, DomainResult<i64>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.last_comment_id += 1;
            Ok(state.last_comment_id)
        })
    }

    fn create_comment(&self, comment: &Comment) -> BoxFuture<'_, DomainResult<Comment>> {
        let comment = comment.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            if !state.posts.contains_key(&comment.post_id) {
                return Err(DomainError::NotFound);
            }
            if state.comments.contains_key(&comment.comment_id) {
                return Err(DomainError::Conflict);
            }
            if comment.path.is_empty() {
                return Err(DomainError::integrity("comment path must be set before insert"));
            }
            state
                .comments_by_post
                .entry(comment.post_id)
                .or_default()
                .push(comment.comment_id);
            state.comments.insert(comment.comment_id, comment.clone());
            Ok(comment)
        })
    }

    fn get_comment(&self, comment_id: i64) -> BoxFuture<'_, DomainResult<Option<Comment>>> {
        Box::pin(async move { Ok(self.state.read().await.comments.get(&comment_id).cloned()) })
    }

    fn list_comments_by_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<Vec<Comment>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut comments: Vec<Comment> = state
                .comments_by_post
                .get(&post_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| state.comments.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default();
            comments.sort_by(compare_thread_order);
            Ok(comments)
        })
    }
}

impl EngagementRepository for InMemoryCommunityStore {
    fn get_target(
        &self,
        target_type: TargetType,
        target_id: i64,
    ) -> BoxFuture<'_, DomainResult<Option<LikeTarget>>> {
        Box::pin(async move { Ok(self.state.read().await.target(target_type, target_id)) })
    }

    fn get_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<Like>>> {
        let key = key.clone();
        Box::pin(async move { Ok(self.state.read().await.likes.get(&key).cloned()) })
    }

    fn insert_like(&self, like: &Like, award: &KarmaEvent) -> BoxFuture<'_, DomainResult<i64>> {
        let like = like.clone();
        let award = award.clone();
        Box::pin(async move {
            let key = like.key();
            let mut state = self.state.write().await;
            if state.likes.contains_key(&key) {
                return Err(DomainError::Conflict);
            }
            if state.like_count_mut(key.target_type, key.target_id).is_none() {
                return Err(DomainError::NotFound);
            }
            if award.key() != key.karma_key() {
                return Err(DomainError::integrity("award does not match like identity"));
            }
            if state.karma.contains_key(&award.key()) {
                return Err(DomainError::integrity(format!(
                    "live karma event already exists for {} {} by {}",
                    key.target_type.as_str(),
                    key.target_id,
                    key.user_id
                )));
            }

            state.append_award(&award)?;
            state.likes.insert(key.clone(), like);
            let count = state
                .like_count_mut(key.target_type, key.target_id)
                .ok_or(DomainError::NotFound)?;
            *count += 1;
            Ok(*count)
        })
    }

    fn delete_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<i64>>> {
        let key = key.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            if !state.likes.contains_key(&key) {
                return Ok(None);
            }
            match state.like_count_mut(key.target_type, key.target_id) {
                Some(count) if *count > 0 => {}
                Some(_) => {
                    return Err(DomainError::integrity(format!(
                        "like_count for {} {} would go negative",
                        key.target_type.as_str(),
                        key.target_id
                    )));
                }
                None => return Err(DomainError::NotFound),
            }

            state.likes.remove(&key);
            state.remove_award(&key.karma_key());
            let count = state
                .like_count_mut(key.target_type, key.target_id)
                .ok_or(DomainError::NotFound)?;
            *count -= 1;
            Ok(Some(*count))
        })
    }

    fn liked_target_ids(
        &self,
        user_id: &str,
        target_type: TargetType,
        target_ids: &[i64],
    ) -> BoxFuture<'_, DomainResult<Vec<i64>>> {
        let user_id = user_id.to_string();
        let target_ids = target_ids.to_vec();
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(target_ids
                .into_iter()
                .filter(|target_id| {
                    state
                        .likes
                        .contains_key(&LikeKey::new(user_id.clone(), target_type, *target_id))
                })
                .collect())
        })
    }
}

impl KarmaLedgerRepository for InMemoryCommunityStore {
    fn record_award(&self, event: &KarmaEvent) -> BoxFuture<'_, DomainResult<KarmaEvent>> {
        let event = event.clone();
        Box::pin(async move {
            self.state.write().await.append_award(&event)?;
            Ok(event)
        })
    }

    fn reverse_award(&self, key: &KarmaKey) -> BoxFuture<'_, DomainResult<bool>> {
        let key = key.clone();
        Box::pin(async move { Ok(self.state.write().await.remove_award(&key)) })
    }

    fn get_event(&self, key: &KarmaKey) -> BoxFuture<'_, DomainResult<Option<KarmaEvent>>> {
        let key = key.clone();
        Box::pin(async move { Ok(self.state.read().await.karma.get(&key).cloned()) })
    }

    fn list_events(
        &self,
        since_ms: i64,
        until_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Vec<KarmaEvent>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let mut events: Vec<KarmaEvent> = state
                .karma
                .values()
                .filter(|event| event.created_at_ms >= since_ms && event.created_at_ms <= until_ms)
                .cloned()
                .collect();
            events.sort_by(|a, b| {
                a.created_at_ms
                    .cmp(&b.created_at_ms)
                    .then_with(|| a.event_id.cmp(&b.event_id))
            });
            Ok(events)
        })
    }

    fn balance(&self, user_id: &str) -> BoxFuture<'_, DomainResult<i64>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .karma
                .values()
                .filter(|event| event.beneficiary_id == user_id)
                .map(|event| event.amount)
                .sum())
        })
    }
}
