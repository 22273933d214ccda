use std::sync::Arc;
use std::time::Duration;

use agora_domain::ports::BoxFuture;
use agora_domain::ports::db::{DbAdapter, DbError};
use surrealdb::{
    Surreal,
    engine::remote::ws::{Client, Ws},
    opt::auth::Root,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::AppConfig;

pub const POST_TABLE: &str = "post";
pub const COMMENT_TABLE: &str = "thread_comment";
pub const LIKE_TABLE: &str = "engagement_like";
pub const KARMA_TABLE: &str = "karma_event";
pub const SEQUENCE_TABLE: &str = "id_sequence";

/// Tables and indexes backing the community store. The unique indexes are what make
/// duplicate likes and duplicate karma awards impossible under concurrency.
const SCHEMA: &str = "\
DEFINE TABLE IF NOT EXISTS post SCHEMALESS;
DEFINE INDEX IF NOT EXISTS post_id_idx ON post FIELDS post_id UNIQUE;
DEFINE INDEX IF NOT EXISTS post_created_idx ON post FIELDS created_at;
DEFINE TABLE IF NOT EXISTS thread_comment SCHEMALESS;
DEFINE INDEX IF NOT EXISTS thread_comment_id_idx ON thread_comment FIELDS comment_id UNIQUE;
DEFINE INDEX IF NOT EXISTS thread_comment_post_path_idx ON thread_comment FIELDS post_id, path;
DEFINE INDEX IF NOT EXISTS thread_comment_path_idx ON thread_comment FIELDS path;
DEFINE TABLE IF NOT EXISTS engagement_like SCHEMALESS;
DEFINE INDEX IF NOT EXISTS engagement_like_identity_idx ON engagement_like \
    FIELDS user_id, target_type, target_id UNIQUE;
DEFINE TABLE IF NOT EXISTS karma_event SCHEMALESS;
DEFINE INDEX IF NOT EXISTS karma_event_key_idx ON karma_event \
    FIELDS source_user_id, reason, target_type, target_id UNIQUE;
DEFINE INDEX IF NOT EXISTS karma_event_window_idx ON karma_event FIELDS created_at, beneficiary_id;
DEFINE TABLE IF NOT EXISTS id_sequence SCHEMALESS;";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
        }
    }
}

pub async fn connect(db_config: &DbConfig) -> anyhow::Result<Arc<Surreal<Client>>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(&db_config.endpoint).await?;
    db.signin(Root {
        username: db_config.username.clone(),
        password: db_config.password.clone(),
    })
    .await?;
    db.use_ns(&db_config.namespace)
        .use_db(&db_config.database)
        .await?;
    tracing::info!(
        endpoint = %db_config.endpoint,
        namespace = %db_config.namespace,
        database = %db_config.database,
        "connected to surrealdb"
    );
    Ok(Arc::new(db))
}

#[derive(Clone)]
pub struct SurrealAdapter {
    config: DbConfig,
    client: Arc<Surreal<Client>>,
}

impl SurrealAdapter {
    pub fn new(config: DbConfig, client: Arc<Surreal<Client>>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }
}

impl DbAdapter for SurrealAdapter {
    fn name(&self) -> &'static str {
        "surrealdb"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async move {
            let address = socket_address(&self.config.endpoint)?;
            timeout(Duration::from_secs(2), TcpStream::connect(&address))
                .await
                .map_err(|_| DbError::Unavailable("surreal endpoint connect timed out".into()))?
                .map_err(|err| {
                    DbError::Unavailable(format!("surreal endpoint connect failed: {err}"))
                })?;
            tracing::debug!(%address, "surreal health check succeeded");
            Ok(())
        })
    }

    fn ensure_schema(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async move {
            self.client
                .query(SCHEMA)
                .await
                .map_err(|err| DbError::Schema(err.to_string()))?
                .check()
                .map_err(|err| DbError::Schema(err.to_string()))?;
            tracing::info!("surreal schema ensured");
            Ok(())
        })
    }
}

/// Adapter for the in-process store; there is nothing to probe or migrate.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryAdapter;

impl DbAdapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async { Ok(()) })
    }

    fn ensure_schema(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async { Ok(()) })
    }
}

fn socket_address(endpoint: &str) -> Result<String, DbError> {
    let normalized = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };
    let parsed = Url::parse(&normalized).map_err(|err| {
        DbError::Unavailable(format!("invalid surreal endpoint '{endpoint}': {err}"))
    })?;
    let host = parsed.host_str().ok_or_else(|| {
        DbError::Unavailable(format!("missing surreal host in endpoint '{endpoint}'"))
    })?;
    let port = parsed.port_or_known_default().unwrap_or(8000);
    Ok(format!("{host}:{port}"))
}
