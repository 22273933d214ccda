use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::engagement::TargetType;
use crate::error::DomainError;
use crate::ports::karma::KarmaLedgerRepository;
use crate::util::now_ms;

pub const POST_LIKE_REWARD: i64 = 5;
pub const COMMENT_LIKE_REWARD: i64 = 1;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum KarmaReason {
    PostLike,
    CommentLike,
}

impl KarmaReason {
    pub fn for_like(target_type: TargetType) -> Self {
        match target_type {
            TargetType::Post => Self::PostLike,
            TargetType::Comment => Self::CommentLike,
        }
    }

    pub fn reward(&self) -> i64 {
        match self {
            Self::PostLike => POST_LIKE_REWARD,
            Self::CommentLike => COMMENT_LIKE_REWARD,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostLike => "post_like",
            Self::CommentLike => "comment_like",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "post_like" => Ok(Self::PostLike),
            "comment_like" => Ok(Self::CommentLike),
            _ => Err(DomainError::Validation(format!(
                "unsupported karma reason '{value}'"
            ))),
        }
    }
}

/// One reward in the append-only ledger.
///
/// `source_user_id` is the user whose action produced the reward; together with
/// `reason`, `target_type` and `target_id` it identifies at most one live event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KarmaEvent {
    pub event_id: String,
    pub beneficiary_id: String,
    pub beneficiary_username: String,
    pub source_user_id: String,
    pub amount: i64,
    pub reason: KarmaReason,
    pub target_type: TargetType,
    pub target_id: i64,
    pub created_at_ms: i64,
}

impl KarmaEvent {
    pub fn key(&self) -> KarmaKey {
        KarmaKey {
            source_user_id: self.source_user_id.clone(),
            reason: self.reason,
            target_type: self.target_type,
            target_id: self.target_id,
        }
    }
}

/// Exact-match scope used to reverse an award.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct KarmaKey {
    pub source_user_id: String,
    pub reason: KarmaReason,
    pub target_type: TargetType,
    pub target_id: i64,
}

#[derive(Clone, Debug)]
pub struct AwardInput {
    pub beneficiary_id: String,
    pub beneficiary_username: String,
    pub source_user_id: String,
    pub amount: i64,
    pub reason: KarmaReason,
    pub target_type: TargetType,
    pub target_id: i64,
}

impl AwardInput {
    pub fn into_event(self, created_at_ms: i64) -> KarmaEvent {
        KarmaEvent {
            event_id: crate::util::uuid_v7_without_dashes(),
            beneficiary_id: self.beneficiary_id,
            beneficiary_username: self.beneficiary_username,
            source_user_id: self.source_user_id,
            amount: self.amount,
            reason: self.reason,
            target_type: self.target_type,
            target_id: self.target_id,
            created_at_ms,
        }
    }
}

/// Ledger operations outside of a like toggle. Like toggles write through
/// `EngagementRepository`, which bundles the same award/reversal with the like row.
#[derive(Clone)]
pub struct KarmaLedgerService {
    repository: Arc<dyn KarmaLedgerRepository>,
}

impl KarmaLedgerService {
    pub fn new(repository: Arc<dyn KarmaLedgerRepository>) -> Self {
        Self { repository }
    }

    pub async fn record_award(&self, input: AwardInput) -> DomainResult<KarmaEvent> {
        validate_award(&input)?;
        let event = input.into_event(now_ms());
        let event = self.repository.record_award(&event).await?;
        tracing::debug!(
            beneficiary_id = %event.beneficiary_id,
            reason = event.reason.as_str(),
            target_type = event.target_type.as_str(),
            target_id = event.target_id,
            amount = event.amount,
            "karma awarded"
        );
        Ok(event)
    }

    /// Deletes the single live event matching `key`. Returns whether one existed.
    pub async fn reverse_award(&self, key: &KarmaKey) -> DomainResult<bool> {
        self.repository.reverse_award(key).await
    }

    pub async fn get_event(&self, key: &KarmaKey) -> DomainResult<Option<KarmaEvent>> {
        self.repository.get_event(key).await
    }

    /// Sum of every live event for `user_id`.
    pub async fn balance(&self, user_id: &str) -> DomainResult<i64> {
        self.repository.balance(user_id).await
    }

    pub async fn list_events(&self, since_ms: i64, until_ms: i64) -> DomainResult<Vec<KarmaEvent>> {
        if since_ms > until_ms {
            return Ok(Vec::new());
        }
        self.repository.list_events(since_ms, until_ms).await
    }
}

fn validate_award(input: &AwardInput) -> DomainResult<()> {
    if input.beneficiary_id.trim().is_empty() {
        return Err(DomainError::Validation("beneficiary_id is required".into()));
    }
    if input.source_user_id.trim().is_empty() {
        return Err(DomainError::Validation("source_user_id is required".into()));
    }
    if input.amount == 0 {
        return Err(DomainError::Validation("amount must be non-zero".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn award(amount: i64) -> AwardInput {
        AwardInput {
            beneficiary_id: "bob".to_string(),
            beneficiary_username: "bob".to_string(),
            source_user_id: "alice".to_string(),
            amount,
            reason: KarmaReason::PostLike,
            target_type: TargetType::Post,
            target_id: 1,
        }
    }

    #[test]
    fn reward_table_matches_target_kind() {
        assert_eq!(KarmaReason::for_like(TargetType::Post).reward(), 5);
        assert_eq!(KarmaReason::for_like(TargetType::Comment).reward(), 1);
        assert_eq!(
            KarmaReason::parse("comment_like").unwrap(),
            KarmaReason::CommentLike
        );
        assert!(KarmaReason::parse("self_like").is_err());
    }

    #[test]
    fn zero_amount_awards_are_rejected() {
        assert!(validate_award(&award(0)).is_err());
        assert!(validate_award(&award(-3)).is_ok());
    }

    #[test]
    fn event_key_scopes_by_source_user() {
        let event = award(5).into_event(1_000);
        let key = event.key();
        assert_eq!(key.source_user_id, "alice");
        assert_eq!(key.reason, KarmaReason::PostLike);
        assert_eq!(key.target_id, 1);
        assert_eq!(event.created_at_ms, 1_000);
    }
}
