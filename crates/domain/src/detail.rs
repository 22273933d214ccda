use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::engagement::{EngagementService, LikeKey, TargetType};
use crate::identity::ActorIdentity;
use crate::threads::{Post, ThreadService};
use crate::tree::{CommentNode, assemble};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub is_liked: bool,
    pub comment_count: usize,
    pub comments: Vec<CommentNode>,
}

/// Read path for a single post: the post, its whole thread as a tree, and the
/// viewer's like state. The number of storage calls does not depend on thread size.
#[derive(Clone)]
pub struct PostDetailService {
    threads: ThreadService,
    engagement: EngagementService,
}

impl PostDetailService {
    pub fn new(threads: ThreadService, engagement: EngagementService) -> Self {
        Self {
            threads,
            engagement,
        }
    }

    pub async fn load(&self, post_id: i64, viewer: Option<&ActorIdentity>) -> DomainResult<PostDetail> {
        let post = self.threads.get_post(post_id).await?;
        let comments = self.threads.list_thread(post_id).await?;
        let comment_ids: Vec<i64> = comments.iter().map(|comment| comment.comment_id).collect();

        let (is_liked, liked_comments) = match viewer {
            Some(viewer) => {
                let is_liked = self
                    .engagement
                    .is_liked(&LikeKey::new(
                        viewer.user_id.clone(),
                        TargetType::Post,
                        post_id,
                    ))
                    .await?;
                let liked = self
                    .engagement
                    .liked_targets(&viewer.user_id, TargetType::Comment, &comment_ids)
                    .await?;
                (is_liked, liked)
            }
            None => (false, HashSet::new()),
        };

        let comment_count = comments.len();
        let forest = assemble(comments)?;
        Ok(PostDetail {
            post,
            is_liked,
            comment_count,
            comments: forest.into_nodes(&liked_comments),
        })
    }
}
