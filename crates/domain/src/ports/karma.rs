use crate::DomainResult;
use crate::karma::{KarmaEvent, KarmaKey};
use crate::ports::BoxFuture;

/// Append-only reward log. Rows are inserted or deleted by exact key, never updated.
pub trait KarmaLedgerRepository: Send + Sync {
    /// `DomainError::Conflict` if a live event already exists for `event.key()`.
    fn record_award(&self, event: &KarmaEvent) -> BoxFuture<'_, DomainResult<KarmaEvent>>;

    fn reverse_award(&self, key: &KarmaKey) -> BoxFuture<'_, DomainResult<bool>>;

    fn get_event(&self, key: &KarmaKey) -> BoxFuture<'_, DomainResult<Option<KarmaEvent>>>;

    /// Events with `since_ms <= created_at_ms <= until_ms`.
    fn list_events(
        &self,
        since_ms: i64,
        until_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Vec<KarmaEvent>>>;

    fn balance(&self, user_id: &str) -> BoxFuture<'_, DomainResult<i64>>;
}
