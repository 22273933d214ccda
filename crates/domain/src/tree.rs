use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::threads::Comment;

/// Rendered comment with its replies, as returned to readers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub is_liked: bool,
    pub children: Vec<CommentNode>,
}

#[derive(Clone, Debug)]
struct ArenaNode {
    comment: Comment,
    children: Vec<usize>,
}

/// Id-indexed arena holding a thread's comment forest.
///
/// Nodes own their comment and the arena slots of their children; parents are found
/// through `index`, never through references between nodes.
#[derive(Clone, Debug, Default)]
pub struct CommentForest {
    nodes: Vec<ArenaNode>,
    index: HashMap<i64, usize>,
    roots: Vec<usize>,
}

/// Rebuilds the comment forest in one pass over `comments`.
///
/// Precondition: `comments` is ordered by `path` (as returned by
/// `ThreadService::list_thread`). A comment whose parent has not been seen yet means
/// the precondition was violated and is reported as `DomainError::Integrity`, as is a
/// repeated comment id.
///
/// Linking is a single O(n) pass. Siblings are then sorted by
/// `(created_at_ms, comment_id)`, which makes the whole call O(n log n) in the worst case.
pub fn assemble(comments: Vec<Comment>) -> DomainResult<CommentForest> {
    let mut forest = CommentForest {
        nodes: Vec::with_capacity(comments.len()),
        index: HashMap::with_capacity(comments.len()),
        roots: Vec::new(),
    };

    for comment in comments {
        let comment_id = comment.comment_id;
        let parent_slot = match comment.parent_id {
            Some(parent_id) => Some(*forest.index.get(&parent_id).ok_or_else(|| {
                DomainError::integrity(format!(
                    "comment {comment_id} precedes its parent {parent_id}; input is not path-ordered"
                ))
            })?),
            None => None,
        };

        let slot = forest.nodes.len();
        if forest.index.insert(comment_id, slot).is_some() {
            return Err(DomainError::integrity(format!(
                "comment {comment_id} appears more than once"
            )));
        }
        forest.nodes.push(ArenaNode {
            comment,
            children: Vec::new(),
        });

        match parent_slot {
            Some(parent_slot) => forest.nodes[parent_slot].children.push(slot),
            None => forest.roots.push(slot),
        }
    }

    forest.order_siblings();
    Ok(forest)
}

impl CommentForest {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, comment_id: i64) -> Option<&Comment> {
        self.index
            .get(&comment_id)
            .map(|slot| &self.nodes[*slot].comment)
    }

    pub fn root_ids(&self) -> Vec<i64> {
        self.roots
            .iter()
            .map(|slot| self.nodes[*slot].comment.comment_id)
            .collect()
    }

    pub fn children_ids(&self, comment_id: i64) -> Option<Vec<i64>> {
        let slot = self.index.get(&comment_id)?;
        Some(
            self.nodes[*slot]
                .children
                .iter()
                .map(|child| self.nodes[*child].comment.comment_id)
                .collect(),
        )
    }

    /// Converts the arena into nested nodes, flagging the comments in `liked`.
    ///
    /// A child's slot is always after its parent's, so walking the slots backwards
    /// finishes every subtree before its parent claims it.
    pub fn into_nodes(self, liked: &HashSet<i64>) -> Vec<CommentNode> {
        let mut built: Vec<Option<CommentNode>> = Vec::with_capacity(self.nodes.len());
        built.resize_with(self.nodes.len(), || None);

        for (slot, node) in self.nodes.into_iter().enumerate().rev() {
            let children = node
                .children
                .iter()
                .filter_map(|child| built.get_mut(*child).and_then(Option::take))
                .collect();
            built[slot] = Some(CommentNode {
                is_liked: liked.contains(&node.comment.comment_id),
                comment: node.comment,
                children,
            });
        }

        self.roots
            .iter()
            .filter_map(|slot| built.get_mut(*slot).and_then(Option::take))
            .collect()
    }

    fn order_siblings(&mut self) {
        let keys: Vec<(i64, i64)> = self
            .nodes
            .iter()
            .map(|node| (node.comment.created_at_ms, node.comment.comment_id))
            .collect();
        self.roots.sort_by_key(|slot| keys[*slot]);
        for node in &mut self.nodes {
            node.children.sort_by_key(|slot| keys[*slot]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::{MAX_COMMENT_DEPTH, compare_thread_order, path_depth};

    fn comment(path: &str, created_at_ms: i64) -> Comment {
        let ids: Vec<i64> = path.split('.').map(|id| id.parse().unwrap()).collect();
        let comment_id = *ids.last().unwrap();
        let parent_id = ids.len().checked_sub(2).map(|idx| ids[idx]);
        Comment {
            comment_id,
            post_id: 1,
            parent_id,
            author_id: "u-1".to_string(),
            author_username: "alice".to_string(),
            content: format!("comment {comment_id}"),
            like_count: 0,
            depth: path_depth(path),
            path: path.to_string(),
            created_at_ms,
        }
    }

    #[test]
    fn assembles_nested_replies() {
        let forest = assemble(vec![
            comment("1", 10),
            comment("1.2", 20),
            comment("1.2.3", 30),
            comment("1.4", 40),
        ])
        .unwrap();

        assert_eq!(forest.root_ids(), vec![1]);
        assert_eq!(forest.children_ids(1), Some(vec![2, 4]));
        assert_eq!(forest.children_ids(2), Some(vec![3]));
        assert_eq!(forest.children_ids(4), Some(vec![]));
    }

    #[test]
    fn every_comment_lands_under_its_parent_once() {
        let mut comments = vec![
            comment("7", 1),
            comment("7.12", 2),
            comment("7.12.100", 3),
            comment("7.9", 4),
            comment("30", 5),
            comment("30.31", 6),
            comment("7.12.13", 7),
        ];
        comments.sort_by(compare_thread_order);
        let forest = assemble(comments.clone()).unwrap();
        assert_eq!(forest.len(), comments.len());

        for item in &comments {
            let Some(parent_id) = item.parent_id else {
                continue;
            };
            let siblings = forest.children_ids(parent_id).unwrap();
            assert_eq!(
                siblings.iter().filter(|id| **id == item.comment_id).count(),
                1
            );
            let parent = forest.get(parent_id).unwrap();
            assert_eq!(item.depth, parent.depth + 1);
        }
    }

    #[test]
    fn siblings_follow_creation_order_not_path_order() {
        let mut comments = vec![comment("1", 0), comment("1.9", 10), comment("1.10", 20)];
        comments.sort_by(compare_thread_order);
        assert_eq!(comments[1].path, "1.10");

        let forest = assemble(comments).unwrap();
        assert_eq!(forest.children_ids(1), Some(vec![9, 10]));
    }

    #[test]
    fn unordered_input_is_rejected() {
        let err = assemble(vec![comment("1.2", 0), comment("1", 0)]).unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = assemble(vec![comment("1", 0), comment("1", 0)]).unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)));
    }

    #[test]
    fn nodes_carry_liked_flags() {
        let forest = assemble(vec![comment("1", 0), comment("1.2", 1)]).unwrap();
        let liked = HashSet::from([2]);
        let nodes = forest.into_nodes(&liked);
        assert_eq!(nodes.len(), 1);
        assert!(!nodes[0].is_liked);
        assert!(nodes[0].children[0].is_liked);
        assert!(nodes[0].children[0].children.is_empty());
    }

    #[test]
    fn deepest_allowed_chain_converts_without_recursion() {
        let mut path = String::from("1");
        let mut chain = vec![comment(&path, 0)];
        for id in 2..=i64::from(MAX_COMMENT_DEPTH) + 1 {
            path = format!("{path}.{id}");
            chain.push(comment(&path, id));
        }
        assert_eq!(chain.last().unwrap().depth, MAX_COMMENT_DEPTH);

        let nodes = assemble(chain).unwrap().into_nodes(&HashSet::new());
        let mut depth = 0;
        let mut level = &nodes;
        while let Some(node) = level.first() {
            assert_eq!(node.comment.depth, depth);
            depth += 1;
            level = &node.children;
        }
        assert_eq!(depth, MAX_COMMENT_DEPTH + 1);
    }

    #[test]
    fn empty_thread_yields_empty_forest() {
        let forest = assemble(Vec::new()).unwrap();
        assert!(forest.is_empty());
        assert!(forest.into_nodes(&HashSet::new()).is_empty());
    }
}
