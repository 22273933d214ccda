use thiserror::Error;

use super::BoxFuture;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("db unavailable: {0}")]
    Unavailable(String),
    #[error("db schema setup failed: {0}")]
    Schema(String),
}

/// Backend-level hooks used at startup and by the health endpoint.
pub trait DbAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>>;

    /// Creates tables and the indexes the engine relies on (unique like identity,
    /// unique karma key, thread path ordering). Must be idempotent.
    fn ensure_schema(&self) -> BoxFuture<'_, Result<(), DbError>>;
}
