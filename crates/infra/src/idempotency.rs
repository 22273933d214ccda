use std::time::Duration;

use agora_domain::ports::BoxFuture;
use agora_domain::ports::idempotency::{
    IdempotencyError, IdempotencyKey, IdempotencyRecord, IdempotencyStore, PutOutcome,
};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

const DEFAULT_PREFIX: &str = "agora:idemp";
const CLAIM_ATTEMPTS: usize = 2;

#[derive(Clone)]
pub struct RedisIdempotencyStore {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisIdempotencyStore {
    pub async fn connect(redis_url: &str) -> Result<Self, IdempotencyError> {
        Self::connect_with_prefix(redis_url, DEFAULT_PREFIX).await
    }

    pub async fn connect_with_prefix(
        redis_url: &str,
        prefix: impl Into<String>,
    ) -> Result<Self, IdempotencyError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| IdempotencyError::Unavailable(err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| IdempotencyError::Unavailable(err.to_string()))?;
        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn encode(record: &IdempotencyRecord) -> Result<String, IdempotencyError> {
        serde_json::to_string(record)
            .map_err(|err| IdempotencyError::Serialization(err.to_string()))
    }

    fn decode(payload: &str) -> Result<IdempotencyRecord, IdempotencyError> {
        serde_json::from_str(payload)
            .map_err(|err| IdempotencyError::Serialization(err.to_string()))
    }

    /// `SET key value [NX|XX] PX ttl`; `None` when the condition rejected the write.
    async fn set_px(
        &self,
        cache_key: &str,
        payload: &str,
        condition: Option<&str>,
        ttl: Duration,
    ) -> Result<Option<String>, IdempotencyError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(cache_key).arg(payload);
        if let Some(condition) = condition {
            cmd.arg(condition);
        }
        cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        let mut conn = self.manager.clone();
        cmd.query_async(&mut conn)
            .await
            .map_err(|err| IdempotencyError::Store(err.to_string()))
    }

    async fn read(&self, cache_key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = conn
            .get(cache_key)
            .await
            .map_err(|err| IdempotencyError::Store(err.to_string()))?;
        payload.as_deref().map(Self::decode).transpose()
    }
}

impl IdempotencyStore for RedisIdempotencyStore {
    fn get(
        &self,
        key: &IdempotencyKey,
    ) -> BoxFuture<'_, Result<Option<IdempotencyRecord>, IdempotencyError>> {
        let cache_key = key.cache_key(&self.prefix);
        Box::pin(async move { self.read(&cache_key).await })
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
            let payload = Self::encode(&record)?;
            for _ in 0..CLAIM_ATTEMPTS {
                if self
                    .set_px(&cache_key, &payload, Some("NX"), ttl)
                    .await?
                    .is_some()
                {
                    return Ok(PutOutcome::Stored);
                }
                // The holder may expire between NX and GET; retry the claim then.
                if let Some(existing) = self.read(&cache_key).await? {
                    return Ok(PutOutcome::Existing(existing));
                }
            }
            Err(IdempotencyError::Store(
                "failed to claim idempotency key".into(),
            ))
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
            let payload = Self::encode(&record)?;
            self.set_px(&cache_key, &payload, None, ttl).await?;
            Ok(())
        })
    }

    fn release(&self, key: &IdempotencyKey) -> BoxFuture<'_, Result<(), IdempotencyError>> {
        let cache_key = key.cache_key(&self.prefix);
        Box::pin(async move {
            let mut conn = self.manager.clone();
            let _: i64 = conn
                .del(&cache_key)
                .await
                .map_err(|err| IdempotencyError::Store(err.to_string()))?;
            Ok(())
        })
    }
}
