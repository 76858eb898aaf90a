//! Comment threads.
//!
//! The upstream builds the reply tree; this module only walks it. Walks use
//! an explicit stack so a pathologically deep thread costs heap, not stack.

use crate::models::{Comment, EntityId};
use crate::utils::relative_time;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Reduces an upstream comment listing to its top-level forest.
///
/// The upstream list endpoint returns every comment of a post, replies
/// included, each with its nested replies. A reply that is reachable through
/// its parent is dropped from the top level. A reply whose parent is missing
/// from the payload is kept as a root so it is not lost.
pub fn top_level(comments: Vec<Comment>) -> Vec<Comment> {
    let mut nested: HashSet<EntityId> = HashSet::new();
    let mut stack: Vec<&Comment> = comments.iter().flat_map(|c| c.replies.iter()).collect();
    while let Some(reply) = stack.pop() {
        if nested.insert(reply.id.clone()) {
            stack.extend(reply.replies.iter());
        }
    }

    comments
        .into_iter()
        .filter(|comment| comment.parent_id.is_none() || !nested.contains(&comment.id))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct ThreadRow<'a> {
    pub depth: usize,
    pub comment: &'a Comment,
}

/// Pre-order walk of the forest. Roots are at depth 0 and every level of
/// replies adds one; siblings keep upstream order.
pub fn flatten(roots: &[Comment]) -> Vec<ThreadRow<'_>> {
    let mut rows = Vec::new();
    let mut stack: Vec<(usize, &Comment)> = roots.iter().rev().map(|c| (0, c)).collect();
    while let Some((depth, comment)) = stack.pop() {
        rows.push(ThreadRow { depth, comment });
        stack.extend(comment.replies.iter().rev().map(|reply| (depth + 1, reply)));
    }
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadEntry {
    pub depth: usize,
    pub id: EntityId,
    pub parent_id: Option<EntityId>,
    pub author_username: String,
    pub author_name: String,
    pub content: String,
    pub created_at: Option<String>,
    pub likes_count: u64,
    pub reply_count: usize,
}

impl From<ThreadRow<'_>> for ThreadEntry {
    fn from(row: ThreadRow<'_>) -> Self {
        let comment = row.comment;
        Self {
            depth: row.depth,
            id: comment.id.clone(),
            parent_id: comment.parent_id.clone(),
            author_username: comment.author.username.clone(),
            author_name: comment.author.display_name().to_string(),
            content: comment.content.clone(),
            created_at: comment.created_at.clone(),
            likes_count: comment.likes_count,
            reply_count: comment.replies.len(),
        }
    }
}

pub fn entries(roots: &[Comment]) -> Vec<ThreadEntry> {
    flatten(roots).into_iter().map(ThreadEntry::from).collect()
}

/// Plain-text rendering, two spaces of indent per level.
pub fn render_text(rows: &[ThreadRow<'_>], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    for row in rows {
        let indent = "  ".repeat(row.depth);
        let comment = row.comment;
        let when = comment
            .created_at
            .as_deref()
            .map(|raw| relative_time(raw, now))
            .unwrap_or_default();
        out.push_str(&format!(
            "{indent}#{} {} (@{}) {} [{} likes]\n",
            comment.id,
            comment.author.display_name(),
            comment.author.username,
            when,
            comment.likes_count,
        ));
        for line in comment.content.lines() {
            out.push_str(&format!("{indent}  {line}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn author(name: &str) -> User {
        User {
            id: EntityId::Number(1),
            email: None,
            username: name.into(),
            full_name: None,
            avatar_url: None,
            bio: None,
            created_at: None,
        }
    }

    fn comment(id: i64, parent: Option<i64>, replies: Vec<Comment>) -> Comment {
        Comment {
            id: EntityId::Number(id),
            content: format!("comment {id}"),
            author: author("demo"),
            post_id: Some(EntityId::Number(1)),
            parent_id: parent.map(EntityId::Number),
            created_at: None,
            updated_at: None,
            likes_count: 0,
            replies,
        }
    }

    fn depths(rows: &[ThreadRow<'_>]) -> Vec<(String, usize)> {
        rows.iter()
            .map(|row| (row.comment.id.to_string(), row.depth))
            .collect()
    }

    #[test]
    fn root_and_reply_get_depth_zero_and_one() {
        let roots = vec![comment(1, None, vec![comment(2, Some(1), vec![])])];
        let rows = flatten(&roots);
        assert_eq!(depths(&rows), vec![("1".into(), 0), ("2".into(), 1)]);
    }

    #[test]
    fn reply_order_is_preserved() {
        let roots = vec![
            comment(
                1,
                None,
                vec![
                    comment(2, Some(1), vec![comment(4, Some(2), vec![])]),
                    comment(3, Some(1), vec![]),
                ],
            ),
            comment(5, None, vec![]),
        ];
        let rows = flatten(&roots);
        assert_eq!(
            depths(&rows),
            vec![
                ("1".into(), 0),
                ("2".into(), 1),
                ("4".into(), 2),
                ("3".into(), 1),
                ("5".into(), 0),
            ]
        );
    }

    #[test]
    fn replies_listed_at_top_level_are_dropped() {
        let listing = vec![
            comment(1, None, vec![comment(2, Some(1), vec![])]),
            comment(2, Some(1), vec![]),
            comment(9, Some(8), vec![]),
        ];
        let roots = top_level(listing);
        let ids: Vec<String> = roots.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, vec!["1".to_string(), "9".to_string()]);
    }

    #[test]
    fn very_deep_threads_do_not_recurse() {
        let mut node = comment(100_000, Some(99_999), vec![]);
        for id in (1..100_000).rev() {
            let parent = if id == 1 { None } else { Some(id - 1) };
            node = comment(id, parent, vec![node]);
        }
        let roots = vec![node];
        let rows = flatten(&roots);
        assert_eq!(rows.len(), 100_000);
        assert_eq!(rows.last().map(|row| row.depth), Some(99_999));
        // Drop iteratively: the derived Drop of a 100k-deep tree would recurse.
        let mut pending = roots;
        while let Some(mut next) = pending.pop() {
            pending.append(&mut next.replies);
        }
    }

    #[test]
    fn text_rendering_indents_replies() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut reply = comment(2, Some(1), vec![]);
        reply.created_at = Some("2024-05-01T10:00:00Z".into());
        let roots = vec![comment(1, None, vec![reply])];
        let text = render_text(&flatten(&roots), now);
        assert_eq!(
            text,
            "#1 demo (@demo)  [0 likes]\n  comment 1\n  #2 demo (@demo) 2h ago [0 likes]\n    comment 2\n"
        );
    }
}
