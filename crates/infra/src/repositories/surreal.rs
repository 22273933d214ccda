use std::sync::Arc;

use agora_domain::DomainResult;
use agora_domain::engagement::{Like, LikeKey, LikeTarget, TargetType};
use agora_domain::error::DomainError;
use agora_domain::karma::{KarmaEvent, KarmaKey, KarmaReason};
use agora_domain::ports::BoxFuture;
use agora_domain::ports::engagement::EngagementRepository;
use agora_domain::ports::karma::KarmaLedgerRepository;
use agora_domain::ports::threads::ThreadRepository;
use agora_domain::threads::{Comment, Post, compare_thread_order};
use agora_domain::util::{format_ms_rfc3339, parse_rfc3339_ms};
use serde::Deserialize;
use serde_json::Value;
use surrealdb::{Surreal, engine::remote::ws::Client};

use crate::db::{
    COMMENT_TABLE, DbConfig, KARMA_TABLE, LIKE_TABLE, POST_TABLE, SEQUENCE_TABLE, connect,
};

const TARGET_NOT_FOUND: &str = "like_target_not_found";
const LIKE_NOT_FOUND: &str = "like_not_found";
const NEGATIVE_LIKE_COUNT: &str = "like_count_would_go_negative";

const POST_COLUMNS: &str = "post_id, author_id, author_username, content, like_count, \
    <string>created_at AS created_at";
const COMMENT_COLUMNS: &str = "comment_id, post_id, parent_id, author_id, author_username, \
    content, like_count, depth, path, <string>created_at AS created_at";
const KARMA_COLUMNS: &str = "event_id, beneficiary_id, beneficiary_username, source_user_id, \
    amount, reason, target_type, target_id, <string>created_at AS created_at";

#[derive(Debug, Deserialize)]
struct SurrealPostRow {
    post_id: i64,
    author_id: String,
    author_username: String,
    content: String,
    like_count: i64,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct SurrealCommentRow {
    comment_id: i64,
    post_id: i64,
    parent_id: Option<i64>,
    author_id: String,
    author_username: String,
    content: String,
    like_count: i64,
    depth: u32,
    path: String,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct SurrealKarmaRow {
    event_id: String,
    beneficiary_id: String,
    beneficiary_username: String,
    source_user_id: String,
    amount: i64,
    reason: String,
    target_type: String,
    target_id: i64,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct SurrealLikeRow {
    user_id: String,
    target_type: String,
    target_id: i64,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct SurrealTargetRow {
    author_id: String,
    author_username: String,
    like_count: i64,
}

/// SurrealDB implementation of the thread, engagement and karma ports.
///
/// Like toggles run as one `BEGIN ... COMMIT` block so the like row, the counter and
/// the karma event change together; the unique indexes from `db::SCHEMA` turn racing
/// duplicates into transaction failures.
#[derive(Clone)]
pub struct SurrealCommunityStore {
    client: Arc<Surreal<Client>>,
}

impl SurrealCommunityStore {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: connect(db_config).await?,
        })
    }

    fn map_surreal_error(err: surrealdb::Error) -> DomainError {
        Self::classify(&err.to_string())
    }

    fn classify(message: &str) -> DomainError {
        let message = message.to_lowercase();
        if message.contains(TARGET_NOT_FOUND) {
            return DomainError::NotFound;
        }
        if message.contains(NEGATIVE_LIKE_COUNT) {
            return DomainError::integrity("like_count would go negative");
        }
        // Only a unique index or an existing record id is a lost uniqueness race. A
        // read/write commit conflict rolled everything back and must not look like one.
        if message.contains("already contains") || message.contains("already exists") {
            return DomainError::Conflict;
        }
        DomainError::integrity(format!("surreal query failed: {message}"))
    }

    fn decode<T: for<'de> Deserialize<'de>>(rows: Vec<Value>, what: &str) -> DomainResult<Vec<T>> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<T>(row)
                    .map_err(|err| DomainError::integrity(format!("invalid {what} row: {err}")))
            })
            .collect()
    }

    fn table_for(target_type: TargetType) -> &'static str {
        match target_type {
            TargetType::Post => POST_TABLE,
            TargetType::Comment => COMMENT_TABLE,
        }
    }

    fn post_from_row(row: SurrealPostRow) -> DomainResult<Post> {
        Ok(Post {
            post_id: row.post_id,
            author_id: row.author_id,
            author_username: row.author_username,
            content: row.content,
            like_count: row.like_count,
            created_at_ms: parse_rfc3339_ms(&row.created_at)?,
        })
    }

    fn comment_from_row(row: SurrealCommentRow) -> DomainResult<Comment> {
        Ok(Comment {
            comment_id: row.comment_id,
            post_id: row.post_id,
            parent_id: row.parent_id,
            author_id: row.author_id,
            author_username: row.author_username,
            content: row.content,
            like_count: row.like_count,
            depth: row.depth,
            path: row.path,
            created_at_ms: parse_rfc3339_ms(&row.created_at)?,
        })
    }

    fn event_from_row(row: SurrealKarmaRow) -> DomainResult<KarmaEvent> {
        Ok(KarmaEvent {
            event_id: row.event_id,
            beneficiary_id: row.beneficiary_id,
            beneficiary_username: row.beneficiary_username,
            source_user_id: row.source_user_id,
            amount: row.amount,
            reason: KarmaReason::parse(&row.reason)?,
            target_type: TargetType::parse(&row.target_type)?,
            target_id: row.target_id,
            created_at_ms: parse_rfc3339_ms(&row.created_at)?,
        })
    }

    async fn next_sequence(&self, name: &'static str) -> DomainResult<i64> {
        let mut response = self
            .client
            .query(format!(
                "UPSERT type::record('{SEQUENCE_TABLE}', $name) SET value = (value ?? 0) + 1 \
                 RETURN VALUE value"
            ))
            .bind(("name", name))
            .await
            .map_err(Self::map_surreal_error)?;
        let values: Vec<Value> = response
            .take(0)
            .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
        values
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| DomainError::integrity(format!("sequence '{name}' returned no value")))
    }

    /// Reads the `like_count` reported by the transaction's own counter update, which
    /// is the last statement returning that field.
    fn committed_like_count(response: &mut surrealdb::IndexedResults) -> DomainResult<i64> {
        for index in (0..response.num_statements()).rev() {
            let Ok(rows) = response.take::<Vec<Value>>(index) else {
                continue;
            };
            if let Some(count) = rows
                .first()
                .and_then(|row| row.get("like_count"))
                .and_then(Value::as_i64)
            {
                return Ok(count);
            }
        }
        Err(DomainError::integrity(
            "like transaction did not report like_count",
        ))
    }

    /// Surfaces the statement that actually failed inside a transaction script; the
    /// other statements only report that the transaction was cancelled.
    fn check_transaction(response: &mut surrealdb::IndexedResults) -> DomainResult<()> {
        let errors = response.take_errors();
        if errors.is_empty() {
            return Ok(());
        }
        let mut messages: Vec<(usize, String)> = errors
            .into_iter()
            .map(|(index, err)| (index, err.to_string()))
            .collect();
        messages.sort();
        let joined = messages
            .into_iter()
            .map(|(_, message)| message)
            .collect::<Vec<_>>()
            .join("; ");
        Err(Self::classify(&joined))
    }
}

impl ThreadRepository for SurrealCommunityStore {
    fn reserve_post_id(&self) -> BoxFuture<'_, DomainResult<i64>> {
        Box::pin(async move { self.next_sequence(POST_TABLE).await })
    }

    fn create_post(&self, post: &Post) -> BoxFuture<'_, DomainResult<Post>> {
        let post = post.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let response = client
                .query(format!(
                    "CREATE type::record('{POST_TABLE}', $post_id) CONTENT {{\n\
                        post_id: $post_id,\n\
                        author_id: $author_id,\n\
                        author_username: $author_username,\n\
                        content: $content,\n\
                        like_count: $like_count,\n\
                        created_at: <datetime>$created_at\n\
                    }};"
                ))
                .bind(("post_id", post.post_id))
                .bind(("author_id", post.author_id.clone()))
                .bind(("author_username", post.author_username.clone()))
                .bind(("content", post.content.clone()))
                .bind(("like_count", post.like_count))
                .bind(("created_at", format_ms_rfc3339(post.created_at_ms)))
                .await
                .map_err(Self::map_surreal_error)?;
            response.check().map_err(Self::map_surreal_error)?;
            Ok(post)
        })
    }

    fn get_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<Option<Post>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {POST_COLUMNS} FROM {POST_TABLE} WHERE post_id = $post_id LIMIT 1"
                ))
                .bind(("post_id", post_id))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            Self::decode::<SurrealPostRow>(rows, "post")?
                .into_iter()
                .next()
                .map(Self::post_from_row)
                .transpose()
        })
    }

    fn list_posts(&self, limit: usize) -> BoxFuture<'_, DomainResult<Vec<Post>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {POST_COLUMNS}, created_at AS created_sort FROM {POST_TABLE} \
                     ORDER BY created_sort DESC, post_id DESC LIMIT $limit"
                ))
                .bind(("limit", limit as i64))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            let mut posts = Self::decode::<SurrealPostRow>(rows, "post")?
                .into_iter()
                .map(Self::post_from_row)
                .collect::<DomainResult<Vec<_>>>()?;
            posts.sort_by(|a, b| {
                b.created_at_ms
                    .cmp(&a.created_at_ms)
                    .then_with(|| b.post_id.cmp(&a.post_id))
            });
            Ok(posts)
        })
    }

    fn reserve_comment_id(&self) -> BoxFuture<'_, DomainResult<i64>> {
        Box::pin(async move { self.next_sequence(COMMENT_TABLE).await })
    }

    fn create_comment(&self, comment: &Comment) -> BoxFuture<'_, DomainResult<Comment>> {
        let comment = comment.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let response = client
                .query(format!(
                    "CREATE type::record('{COMMENT_TABLE}', $comment_id) CONTENT {{\n\
                        comment_id: $comment_id,\n\
                        post_id: $post_id,\n\
                        parent_id: $parent_id,\n\
                        author_id: $author_id,\n\
                        author_username: $author_username,\n\
                        content: $content,\n\
                        like_count: $like_count,\n\
                        depth: $depth,\n\
                        path: $path,\n\
                        created_at: <datetime>$created_at\n\
                    }};"
                ))
                .bind(("comment_id", comment.comment_id))
                .bind(("post_id", comment.post_id))
                .bind(("parent_id", comment.parent_id))
                .bind(("author_id", comment.author_id.clone()))
                .bind(("author_username", comment.author_username.clone()))
                .bind(("content", comment.content.clone()))
                .bind(("like_count", comment.like_count))
                .bind(("depth", i64::from(comment.depth)))
                .bind(("path", comment.path.clone()))
                .bind(("created_at", format_ms_rfc3339(comment.created_at_ms)))
                .await
                .map_err(Self::map_surreal_error)?;
            response.check().map_err(Self::map_surreal_error)?;
            Ok(comment)
        })
    }

    fn get_comment(&self, comment_id: i64) -> BoxFuture<'_, DomainResult<Option<Comment>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {COMMENT_COLUMNS} FROM {COMMENT_TABLE} \
                     WHERE comment_id = $comment_id LIMIT 1"
                ))
                .bind(("comment_id", comment_id))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            Self::decode::<SurrealCommentRow>(rows, "comment")?
                .into_iter()
                .next()
                .map(Self::comment_from_row)
                .transpose()
        })
    }

    fn list_comments_by_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<Vec<Comment>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {COMMENT_COLUMNS} FROM {COMMENT_TABLE} \
                     WHERE post_id = $post_id ORDER BY path ASC"
                ))
                .bind(("post_id", post_id))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            let mut comments = Self::decode::<SurrealCommentRow>(rows, "comment")?
                .into_iter()
                .map(Self::comment_from_row)
                .collect::<DomainResult<Vec<_>>>()?;
            comments.sort_by(compare_thread_order);
            Ok(comments)
        })
    }
}

impl EngagementRepository for SurrealCommunityStore {
    fn get_target(
        &self,
        target_type: TargetType,
        target_id: i64,
    ) -> BoxFuture<'_, DomainResult<Option<LikeTarget>>> {
        let client = self.client.clone();
        let table = Self::table_for(target_type);
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT author_id, author_username, like_count \
                     FROM type::record('{table}', $target_id)"
                ))
                .bind(("target_id", target_id))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            Ok(Self::decode::<SurrealTargetRow>(rows, "like target")?
                .into_iter()
                .next()
                .map(|row| LikeTarget {
                    target_type,
                    target_id,
                    author_id: row.author_id,
                    author_username: row.author_username,
                    like_count: row.like_count,
                }))
        })
    }

    fn get_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<Like>>> {
        let key = key.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT user_id, target_type, target_id, <string>created_at AS created_at \
                     FROM {LIKE_TABLE} \
                     WHERE user_id = $user_id AND target_type = $target_type \
                        AND target_id = $target_id LIMIT 1"
                ))
                .bind(("user_id", key.user_id.clone()))
                .bind(("target_type", key.target_type.as_str()))
                .bind(("target_id", key.target_id))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            Self::decode::<SurrealLikeRow>(rows, "like")?
                .into_iter()
                .next()
                .map(|row| -> DomainResult<Like> {
                    Ok(Like {
                        user_id: row.user_id,
                        target_type: TargetType::parse(&row.target_type)?,
                        target_id: row.target_id,
                        created_at_ms: parse_rfc3339_ms(&row.created_at)?,
                    })
                })
                .transpose()
        })
    }

    fn insert_like(&self, like: &Like, award: &KarmaEvent) -> BoxFuture<'_, DomainResult<i64>> {
        let like = like.clone();
        let award = award.clone();
        Box::pin(async move {
            if award.key() != like.key().karma_key() {
                return Err(DomainError::integrity("award does not match like identity"));
            }
            let table = Self::table_for(like.target_type);
            let mut response = self
                .client
                .query(format!(
                    "BEGIN TRANSACTION;\n\
                     IF array::len(SELECT VALUE id FROM type::record('{table}', $target_id)) = 0 {{\n\
                        THROW '{TARGET_NOT_FOUND}';\n\
                     }};\n\
                     CREATE {LIKE_TABLE} CONTENT {{\n\
                        user_id: $user_id,\n\
                        target_type: $target_type,\n\
                        target_id: $target_id,\n\
                        created_at: <datetime>$like_created_at\n\
                     }};\n\
                     CREATE {KARMA_TABLE} CONTENT {{\n\
                        event_id: $event_id,\n\
                        beneficiary_id: $beneficiary_id,\n\
                        beneficiary_username: $beneficiary_username,\n\
                        source_user_id: $user_id,\n\
                        amount: $amount,\n\
                        reason: $reason,\n\
                        target_type: $target_type,\n\
                        target_id: $target_id,\n\
                        created_at: <datetime>$award_created_at\n\
                     }};\n\
                     UPDATE type::record('{table}', $target_id) SET like_count += 1 \
                        RETURN like_count;\n\
                     COMMIT TRANSACTION;"
                ))
                .bind(("user_id", like.user_id.clone()))
                .bind(("target_type", like.target_type.as_str()))
                .bind(("target_id", like.target_id))
                .bind(("like_created_at", format_ms_rfc3339(like.created_at_ms)))
                .bind(("event_id", award.event_id.clone()))
                .bind(("beneficiary_id", award.beneficiary_id.clone()))
                .bind(("beneficiary_username", award.beneficiary_username.clone()))
                .bind(("amount", award.amount))
                .bind(("reason", award.reason.as_str()))
                .bind(("award_created_at", format_ms_rfc3339(award.created_at_ms)))
                .await
                .map_err(Self::map_surreal_error)?;
            Self::check_transaction(&mut response)?;
            Self::committed_like_count(&mut response)
        })
    }

    fn delete_like(&self, key: &LikeKey) -> BoxFuture<'_, DomainResult<Option<i64>>> {
        let key = key.clone();
        Box::pin(async move {
            let table = Self::table_for(key.target_type);
            let karma = key.karma_key();
            let mut response = self
                .client
                .query(format!(
                    "BEGIN TRANSACTION;\n\
                     LET $removed = (DELETE {LIKE_TABLE} \
                        WHERE user_id = $user_id AND target_type = $target_type \
                            AND target_id = $target_id RETURN BEFORE);\n\
                     IF array::len($removed) = 0 {{ THROW '{LIKE_NOT_FOUND}'; }};\n\
                     IF (SELECT VALUE like_count FROM type::record('{table}', $target_id))[0] <= 0 {{\n\
                        THROW '{NEGATIVE_LIKE_COUNT}';\n\
                     }};\n\
                     DELETE {KARMA_TABLE} \
                        WHERE source_user_id = $user_id AND reason = $reason \
                            AND target_type = $target_type AND target_id = $target_id;\n\
                     UPDATE type::record('{table}', $target_id) SET like_count -= 1 \
                        RETURN like_count;\n\
                     COMMIT TRANSACTION;"
                ))
                .bind(("user_id", key.user_id.clone()))
                .bind(("target_type", key.target_type.as_str()))
                .bind(("target_id", key.target_id))
                .bind(("reason", karma.reason.as_str()))
                .await
                .map_err(Self::map_surreal_error)?;
            match Self::check_transaction(&mut response) {
                Ok(()) => {}
                Err(DomainError::Integrity(message)) if message.contains(LIKE_NOT_FOUND) => {
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
            Self::committed_like_count(&mut response).map(Some)
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
        let client = self.client.clone();
        Box::pin(async move {
            if target_ids.is_empty() {
                return Ok(Vec::new());
            }
            let mut response = client
                .query(format!(
                    "SELECT VALUE target_id FROM {LIKE_TABLE} \
                     WHERE user_id = $user_id AND target_type = $target_type \
                        AND target_id IN $target_ids"
                ))
                .bind(("user_id", user_id))
                .bind(("target_type", target_type.as_str()))
                .bind(("target_ids", target_ids))
                .await
                .map_err(Self::map_surreal_error)?;
            let values: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            Ok(values.iter().filter_map(Value::as_i64).collect())
        })
    }
}

impl KarmaLedgerRepository for SurrealCommunityStore {
    fn record_award(&self, event: &KarmaEvent) -> BoxFuture<'_, DomainResult<KarmaEvent>> {
        let event = event.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let response = client
                .query(format!(
                    "CREATE {KARMA_TABLE} CONTENT {{\n\
                        event_id: $event_id,\n\
                        beneficiary_id: $beneficiary_id,\n\
                        beneficiary_username: $beneficiary_username,\n\
                        source_user_id: $source_user_id,\n\
                        amount: $amount,\n\
                        reason: $reason,\n\
                        target_type: $target_type,\n\
                        target_id: $target_id,\n\
                        created_at: <datetime>$created_at\n\
                    }};"
                ))
                .bind(("event_id", event.event_id.clone()))
                .bind(("beneficiary_id", event.beneficiary_id.clone()))
                .bind(("beneficiary_username", event.beneficiary_username.clone()))
                .bind(("source_user_id", event.source_user_id.clone()))
                .bind(("amount", event.amount))
                .bind(("reason", event.reason.as_str()))
                .bind(("target_type", event.target_type.as_str()))
                .bind(("target_id", event.target_id))
                .bind(("created_at", format_ms_rfc3339(event.created_at_ms)))
                .await
                .map_err(Self::map_surreal_error)?;
            response.check().map_err(Self::map_surreal_error)?;
            Ok(event)
        })
    }

    fn reverse_award(&self, key: &KarmaKey) -> BoxFuture<'_, DomainResult<bool>> {
        let key = key.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "DELETE {KARMA_TABLE} \
                     WHERE source_user_id = $source_user_id AND reason = $reason \
                        AND target_type = $target_type AND target_id = $target_id \
                     RETURN BEFORE"
                ))
                .bind(("source_user_id", key.source_user_id))
                .bind(("reason", key.reason.as_str()))
                .bind(("target_type", key.target_type.as_str()))
                .bind(("target_id", key.target_id))
                .await
                .map_err(Self::map_surreal_error)?;
            let removed: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            Ok(!removed.is_empty())
        })
    }

    fn get_event(&self, key: &KarmaKey) -> BoxFuture<'_, DomainResult<Option<KarmaEvent>>> {
        let key = key.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {KARMA_COLUMNS} FROM {KARMA_TABLE} \
                     WHERE source_user_id = $source_user_id AND reason = $reason \
                        AND target_type = $target_type AND target_id = $target_id LIMIT 1"
                ))
                .bind(("source_user_id", key.source_user_id))
                .bind(("reason", key.reason.as_str()))
                .bind(("target_type", key.target_type.as_str()))
                .bind(("target_id", key.target_id))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            Self::decode::<SurrealKarmaRow>(rows, "karma event")?
                .into_iter()
                .next()
                .map(Self::event_from_row)
                .transpose()
        })
    }

    fn list_events(
        &self,
        since_ms: i64,
        until_ms: i64,
    ) -> BoxFuture<'_, DomainResult<Vec<KarmaEvent>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT {KARMA_COLUMNS} FROM {KARMA_TABLE} \
                     WHERE created_at >= <datetime>$since AND created_at <= <datetime>$until"
                ))
                .bind(("since", format_ms_rfc3339(since_ms)))
                .bind(("until", format_ms_rfc3339(until_ms)))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            let mut events = Self::decode::<SurrealKarmaRow>(rows, "karma event")?
                .into_iter()
                .map(Self::event_from_row)
                .collect::<DomainResult<Vec<_>>>()?;
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
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT math::sum(amount) AS total FROM {KARMA_TABLE} \
                     WHERE beneficiary_id = $user_id GROUP ALL"
                ))
                .bind(("user_id", user_id))
                .await
                .map_err(Self::map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::integrity(format!("invalid query result: {err}")))?;
            Ok(rows
                .first()
                .and_then(|row| row.get("total"))
                .and_then(Value::as_i64)
                .unwrap_or(0))
        })
    }
}
