use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::ports::BoxFuture;
use crate::ports::idempotency::{
    IdempotencyError, IdempotencyKey, IdempotencyRecord, IdempotencyResponse, IdempotencyStore,
    PutOutcome,
};

pub const OP_CREATE_POST: &str = "post_create";
pub const OP_CREATE_COMMENT: &str = "comment_create";
pub const OP_TOGGLE_LIKE: &str = "like_toggle";

#[derive(Clone, Debug)]
pub struct IdempotencyConfig {
    pub in_progress_ttl: Duration,
    pub completed_ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            in_progress_ttl: Duration::from_secs(30),
            completed_ttl: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BeginOutcome {
    Started,
    InProgress,
    Replay(IdempotencyResponse),
}

/// Guards mutations against blind client retries: a repeated request id replays the
/// first response instead of running the mutation again (a second like toggle would
/// otherwise undo the first).
#[derive(Clone)]
pub struct IdempotencyService {
    store: Arc<dyn IdempotencyStore>,
    config: IdempotencyConfig,
}

impl IdempotencyService {
    pub fn new(store: Arc<dyn IdempotencyStore>, config: IdempotencyConfig) -> Self {
        Self { store, config }
    }

    pub async fn begin(&self, key: &IdempotencyKey) -> Result<BeginOutcome, IdempotencyError> {
        let outcome = self
            .store
            .put_if_absent(key, &IdempotencyRecord::InProgress, self.config.in_progress_ttl)
            .await?;
        Ok(match outcome {
            PutOutcome::Stored => BeginOutcome::Started,
            PutOutcome::Existing(IdempotencyRecord::InProgress) => BeginOutcome::InProgress,
            PutOutcome::Existing(IdempotencyRecord::Completed(response)) => {
                BeginOutcome::Replay(response)
            }
        })
    }

    pub async fn complete(
        &self,
        key: &IdempotencyKey,
        response: IdempotencyResponse,
    ) -> Result<(), IdempotencyError> {
        self.store
            .update(
                key,
                &IdempotencyRecord::Completed(response),
                self.config.completed_ttl,
            )
            .await
    }

    pub async fn abandon(&self, key: &IdempotencyKey) -> Result<(), IdempotencyError> {
        self.store.release(key).await
    }
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    record: IdempotencyRecord,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(record: IdempotencyRecord, ttl: Duration) -> Self {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        Self { record, expires_at }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// Process-local store for tests and single-node deployments.
#[derive(Clone, Debug)]
pub struct InMemoryIdempotencyStore {
    prefix: String,
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn get(
        &self,
        key: &IdempotencyKey,
    ) -> BoxFuture<'_, Result<Option<IdempotencyRecord>, IdempotencyError>> {
        let cache_key = key.cache_key(&self.prefix);
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            match entries.get(&cache_key) {
                Some(entry) if entry.is_live(Instant::now()) => Ok(Some(entry.record.clone())),
                Some(_) => {
                    entries.remove(&cache_key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn put_if_absent(
        &self,
        key: &IdempotencyKey,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<PutOutcome, IdempotencyError>> {
        let cache_key = key.cache_key(&self.prefix);
        let record = record.clone();
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get(&cache_key) {
                if entry.is_live(Instant::now()) {
                    return Ok(PutOutcome::Existing(entry.record.clone()));
                }
            }
            entries.insert(cache_key, MemoryEntry::new(record, ttl));
            Ok(PutOutcome::Stored)
        })
    }

    fn update(
        &self,
        key: &IdempotencyKey,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = key.cache_key(&self.prefix);
        let record = record.clone();
        Box::pin(async move {
            self.entries
                .lock()
                .await
                .insert(cache_key, MemoryEntry::new(record, ttl));
            Ok(())
        })
    }

    fn release(&self, key: &IdempotencyKey) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = key.cache_key(&self.prefix);
        Box::pin(async move {
            self.entries.lock().await.remove(&cache_key);
            Ok(())
        })
    }
}
