use crate::DomainResult;
use crate::ports::BoxFuture;
use crate::threads::{Comment, Post};

/// Storage for posts and their comment threads.
///
/// Ids come from per-table sequences: callers reserve an id, build the full record,
/// then insert it, so a stored comment always carries its final `path`.
pub trait ThreadRepository: Send + Sync {
    fn reserve_post_id(&self) -> BoxFuture<'_, DomainResult<i64>>;

    fn create_post(&self, post: &Post) -> BoxFuture<'_, DomainResult<Post>>;

    fn get_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<Option<Post>>>;

    /// Newest first.
    fn list_posts(&self, limit: usize) -> BoxFuture<'_, DomainResult<Vec<Post>>>;

    fn reserve_comment_id(&self) -> BoxFuture<'_, DomainResult<i64>>;

    fn create_comment(&self, comment: &Comment) -> BoxFuture<'_, DomainResult<Comment>>;

    fn get_comment(&self, comment_id: i64) -> BoxFuture<'_, DomainResult<Option<Comment>>>;

    /// All comments of a post ordered by `path`.
    fn list_comments_by_post(&self, post_id: i64) -> BoxFuture<'_, DomainResult<Vec<Comment>>>;
}
