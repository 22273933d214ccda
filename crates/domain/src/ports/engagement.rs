use crate::DomainResult;
use crate::engagement::{Like, LikeKey, LikeTarget, TargetType};
use crate::karma::KarmaEvent;
use crate::ports::BoxFuture;

pub trait EngagementRepository: Send + Sync {
    fn get_target(
        &self,
        target_type: TargetType,
        target_id: i64,
    ) -> BoxFuture<'_, DomainResult<Option<LikeTarget>>>;

    fn get_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<Like>>>;

    /// Atomically inserts `like`, adds one to the target's `like_count` and appends
    /// `award`. Returns the new count, `DomainError::Conflict` when the like already
    /// exists, or `DomainError::NotFound` when the target is gone. On any error nothing
    /// is applied.
    fn insert_like(&self, like: &Like, award: &KarmaEvent) -> BoxFuture<'_, DomainResult<i64>>;

    /// Atomically deletes the like for `key`, subtracts one from `like_count` and
    /// deletes the karma event matching `key.karma_key()`. Returns the new count, or
    /// `None` when there was no live like to delete.
    fn delete_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<i64>>>;

    fn liked_target_ids(
        &self,
        user_id: &str,
        target_type: TargetType,
        target_ids: &[i64],
    ) -> BoxFuture<'_, DomainResult<Vec<i64>>>;
}
