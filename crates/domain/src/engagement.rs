use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::karma::{AwardInput, KarmaEvent, KarmaKey, KarmaReason};
use crate::ports::engagement::EngagementRepository;
use crate::util::now_ms;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Post,
    Comment,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value.trim() {
            "post" => Ok(Self::Post),
            "comment" => Ok(Self::Comment),
            other => Err(DomainError::Validation(format!(
                "unsupported target_type '{other}'"
            ))),
        }
    }
}

/// Identity of a like row; storage keeps at most one live row per key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LikeKey {
    pub user_id: String,
    pub target_type: TargetType,
    pub target_id: i64,
}

impl LikeKey {
    pub fn new(user_id: impl Into<String>, target_type: TargetType, target_id: i64) -> Self {
        Self {
            user_id: user_id.into(),
            target_type,
            target_id,
        }
    }

    /// The ledger entry created alongside this like.
    pub fn karma_key(&self) -> KarmaKey {
        KarmaKey {
            source_user_id: self.user_id.clone(),
            reason: KarmaReason::for_like(self.target_type),
            target_type: self.target_type,
            target_id: self.target_id,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Like {
    pub user_id: String,
    pub target_type: TargetType,
    pub target_id: i64,
    pub created_at_ms: i64,
}

impl Like {
    pub fn key(&self) -> LikeKey {
        LikeKey::new(self.user_id.clone(), self.target_type, self.target_id)
    }
}

/// The likeable record as seen by the engagement engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikeTarget {
    pub target_type: TargetType,
    pub target_id: i64,
    pub author_id: String,
    pub author_username: String,
    pub like_count: i64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    Liked,
    Unliked,
    /// A concurrent toggle inserted the same like first.
    AlreadyLiked,
    /// A concurrent toggle removed the like first.
    AlreadyUnliked,
}

impl ToggleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Liked => "liked",
            Self::Unliked => "unliked",
            Self::AlreadyLiked => "already_liked",
            Self::AlreadyUnliked => "already_unliked",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeToggle {
    pub target_type: TargetType,
    pub target_id: i64,
    pub is_liked: bool,
    pub like_count: i64,
    pub outcome: ToggleOutcome,
}

#[derive(Clone)]
pub struct EngagementService {
    repository: Arc<dyn EngagementRepository>,
}

impl EngagementService {
    pub fn new(repository: Arc<dyn EngagementRepository>) -> Self {
        Self { repository }
    }

    /// Flips the caller's like on a post or comment.
    ///
    /// The like row, the relative `like_count` change and the karma award (or its exact
    /// reversal) are committed by the repository as one unit. Losing an insert race to
    /// a concurrent toggle is not an error: the caller gets the state the winner
    /// produced.
    pub async fn toggle_like(
        &self,
        actor: &ActorIdentity,
        target_type: &str,
        target_id: i64,
    ) -> DomainResult<LikeToggle> {
        let target_type = TargetType::parse(target_type)?;
        let target = self.load_target(target_type, target_id).await?;
        let key = LikeKey::new(actor.user_id.clone(), target_type, target_id);

        let result = if self.repository.get_like(&key).await?.is_some() {
            self.unlike(&key).await
        } else {
            self.like(&key, &target).await
        };

        match result {
            Ok(toggle) => {
                tracing::debug!(
                    user_id = %key.user_id,
                    target_type = target_type.as_str(),
                    target_id,
                    outcome = toggle.outcome.as_str(),
                    like_count = toggle.like_count,
                    "like toggled"
                );
                Ok(toggle)
            }
            Err(DomainError::Integrity(message)) => {
                tracing::error!(
                    user_id = %key.user_id,
                    target_type = target_type.as_str(),
                    target_id,
                    error = %message,
                    "like toggle rolled back"
                );
                Err(DomainError::Integrity(message))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn is_liked(&self, key: &LikeKey) -> DomainResult<bool> {
        Ok(self.repository.get_like(key).await?.is_some())
    }

    /// Subset of `target_ids` currently liked by `user_id`.
    pub async fn liked_targets(
        &self,
        user_id: &str,
        target_type: TargetType,
        target_ids: &[i64],
    ) -> DomainResult<HashSet<i64>> {
        if target_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let liked = self
            .repository
            .liked_target_ids(user_id, target_type, target_ids)
            .await?;
        Ok(liked.into_iter().collect())
    }

    async fn like(&self, key: &LikeKey, target: &LikeTarget) -> DomainResult<LikeToggle> {
        let now = now_ms();
        let like = Like {
            user_id: key.user_id.clone(),
            target_type: key.target_type,
            target_id: key.target_id,
            created_at_ms: now,
        };
        let award = like_award(key, target, now);

        match self.repository.insert_like(&like, &award).await {
            Ok(like_count) => Ok(toggle(key, true, like_count, ToggleOutcome::Liked)),
            Err(DomainError::Conflict) => {
                if self.repository.get_like(key).await?.is_none() {
                    return Err(DomainError::integrity(format!(
                        "like insert for {} on {} {} reported a conflict but no like exists",
                        key.user_id,
                        key.target_type.as_str(),
                        key.target_id
                    )));
                }
                tracing::debug!(
                    user_id = %key.user_id,
                    target_type = key.target_type.as_str(),
                    target_id = key.target_id,
                    "like insert lost race; returning existing state"
                );
                let current = self.load_target(key.target_type, key.target_id).await?;
                Ok(toggle(
                    key,
                    true,
                    current.like_count,
                    ToggleOutcome::AlreadyLiked,
                ))
            }
            Err(err) => Err(err),
        }
    }

    async fn unlike(&self, key: &LikeKey) -> DomainResult<LikeToggle> {
        match self.repository.delete_like(key).await? {
            Some(like_count) => Ok(toggle(key, false, like_count, ToggleOutcome::Unliked)),
            None => {
                let current = self.load_target(key.target_type, key.target_id).await?;
                Ok(toggle(
                    key,
                    false,
                    current.like_count,
                    ToggleOutcome::AlreadyUnliked,
                ))
            }
        }
    }

    async fn load_target(&self, target_type: TargetType, target_id: i64) -> DomainResult<LikeTarget> {
        self.repository
            .get_target(target_type, target_id)
            .await?
            .ok_or(DomainError::NotFound)
    }
}

/// The reward paid to the target's author for the like identified by `key`.
pub fn like_award(key: &LikeKey, target: &LikeTarget, created_at_ms: i64) -> KarmaEvent {
    let reason = KarmaReason::for_like(key.target_type);
    AwardInput {
        beneficiary_id: target.author_id.clone(),
        beneficiary_username: target.author_username.clone(),
        source_user_id: key.user_id.clone(),
        amount: reason.reward(),
        reason,
        target_type: key.target_type,
        target_id: key.target_id,
    }
    .into_event(created_at_ms)
}

fn toggle(key: &LikeKey, is_liked: bool, like_count: i64, outcome: ToggleOutcome) -> LikeToggle {
    LikeToggle {
        target_type: key.target_type,
        target_id: key.target_id,
        is_liked,
        like_count,
        outcome,
    }
}
