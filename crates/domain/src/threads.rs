use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::ActorIdentity;
use crate::ports::threads::ThreadRepository;
use crate::util::{normalize_content, now_ms};

pub const MAX_POST_LENGTH: usize = 10_000;
pub const MAX_COMMENT_LENGTH: usize = 5_000;
/// Deepest reply allowed; root comments sit at depth 0.
pub const MAX_COMMENT_DEPTH: u32 = 32;
pub const PATH_SEPARATOR: char = '.';

const DEFAULT_POST_LIMIT: usize = 20;
const MAX_POST_LIMIT: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub post_id: i64,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub like_count: i64,
    pub created_at_ms: i64,
}

/// A comment in a post's thread.
///
/// `path` is the dot-joined id chain from the root ancestor down to this comment and
/// `depth` is the number of ancestors. Because every proper prefix of a string sorts
/// before the string itself, ordering a thread by `path` places each ancestor ahead of
/// all of its descendants.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub comment_id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub like_count: i64,
    pub depth: u32,
    pub path: String,
    pub created_at_ms: i64,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct PostCreate {
    pub content: String,
}

#[derive(Clone, Debug)]
pub struct CommentCreate {
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
}

/// Path and depth for a comment with `comment_id` placed under `parent`.
pub fn materialize_path(parent: Option<&Comment>, comment_id: i64) -> (String, u32) {
    match parent {
        Some(parent) => (
            format!("{}{PATH_SEPARATOR}{comment_id}", parent.path),
            parent.depth + 1,
        ),
        None => (comment_id.to_string(), 0),
    }
}

pub fn path_depth(path: &str) -> u32 {
    path.matches(PATH_SEPARATOR).count() as u32
}

pub fn compare_thread_order(left: &Comment, right: &Comment) -> std::cmp::Ordering {
    left.path.cmp(&right.path)
}

#[derive(Clone)]
pub struct ThreadService {
    repository: Arc<dyn ThreadRepository>,
}

impl ThreadService {
    pub fn new(repository: Arc<dyn ThreadRepository>) -> Self {
        Self { repository }
    }

    pub async fn create_post(&self, actor: &ActorIdentity, input: PostCreate) -> DomainResult<Post> {
        let content = normalize_content("content", &input.content, MAX_POST_LENGTH)?;
        let post_id = self.repository.reserve_post_id().await?;
        let post = Post {
            post_id,
            author_id: actor.user_id.clone(),
            author_username: actor.username.clone(),
            content,
            like_count: 0,
            created_at_ms: now_ms(),
        };
        let post = self.repository.create_post(&post).await?;
        tracing::debug!(post_id = post.post_id, author_id = %post.author_id, "post created");
        Ok(post)
    }

    pub async fn get_post(&self, post_id: i64) -> DomainResult<Post> {
        self.repository
            .get_post(post_id)
            .await?
            .ok_or(DomainError::NotFound)
    }

    pub async fn list_posts(&self, limit: Option<usize>) -> DomainResult<Vec<Post>> {
        let limit = limit.unwrap_or(DEFAULT_POST_LIMIT).clamp(1, MAX_POST_LIMIT);
        self.repository.list_posts(limit).await
    }

    /// Creates a comment with its materialized path already in place.
    ///
    /// The id is reserved from storage first, then the full row (path included) is
    /// written in one insert, so no reader can observe a comment without its path.
    pub async fn create_comment(
        &self,
        actor: &ActorIdentity,
        input: CommentCreate,
    ) -> DomainResult<Comment> {
        let content = normalize_content("content", &input.content, MAX_COMMENT_LENGTH)?;
        self.get_post(input.post_id).await?;

        let parent = match input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .repository
                    .get_comment(parent_id)
                    .await?
                    .filter(|parent| parent.post_id == input.post_id)
                    .ok_or(DomainError::NotFound)?;
                if parent.depth >= MAX_COMMENT_DEPTH {
                    return Err(DomainError::Validation(format!(
                        "replies may nest at most {MAX_COMMENT_DEPTH} levels deep"
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        let comment_id = self.repository.reserve_comment_id().await?;
        let (path, depth) = materialize_path(parent.as_ref(), comment_id);
        let comment = Comment {
            comment_id,
            post_id: input.post_id,
            parent_id: parent.as_ref().map(|parent| parent.comment_id),
            author_id: actor.user_id.clone(),
            author_username: actor.username.clone(),
            content,
            like_count: 0,
            depth,
            path,
            created_at_ms: now_ms(),
        };

        let comment = self.repository.create_comment(&comment).await?;
        tracing::debug!(
            post_id = comment.post_id,
            comment_id = comment.comment_id,
            path = %comment.path,
            "comment created"
        );
        Ok(comment)
    }

    /// Every comment of the post, ordered by `path`.
    pub async fn list_thread(&self, post_id: i64) -> DomainResult<Vec<Comment>> {
        self.get_post(post_id).await?;
        let mut comments = self.repository.list_comments_by_post(post_id).await?;
        comments.sort_by(compare_thread_order);
        Ok(comments)
    }
}
