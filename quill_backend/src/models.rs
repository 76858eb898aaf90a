use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream identifiers are integers today; anything else is accepted and
/// carried as text so the proxy never rejects a payload over id formatting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{n}"),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    #[serde(default)]
    pub email: Option<String>,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub author: User,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default = "default_published")]
    pub published: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub comments_count: u64,
    #[serde(default)]
    pub bookmarks_count: u64,
    #[serde(default)]
    pub reposts_count: u64,
}

fn default_published() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub content: String,
    pub author: User,
    #[serde(default, alias = "post")]
    pub post_id: Option<EntityId>,
    #[serde(default, alias = "parent")]
    pub parent_id: Option<EntityId>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

/// Django REST framework's page envelope. List endpoints may also answer
/// with a bare array, so both shapes are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page {
        count: u64,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
        results: Vec<T>,
    },
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    pub fn total(&self) -> u64 {
        match self {
            Listing::Page { count, .. } => *count,
            Listing::Plain(items) => items.len() as u64,
        }
    }

    /// Link to the following page; a bare array is always the last page.
    pub fn next(&self) -> Option<&str> {
        match self {
            Listing::Page { next, .. } => next.as_deref(),
            Listing::Plain(_) => None,
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Page { results, .. } => results,
            Listing::Plain(items) => items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let limit = limit.max(1);
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub pagination: Pagination,
}

/// Body of a toggle endpoint. `detail` is either a sentinel string naming a
/// removal or the freshly created record.
#[derive(Debug, Clone, Deserialize)]
pub struct ToggleReply {
    #[serde(default)]
    pub detail: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comment_accepts_upstream_field_names() {
        let comment: Comment = serde_json::from_value(json!({
            "id": 7,
            "content": "hi",
            "author": {"id": 1, "username": "demo"},
            "parent": 3,
            "likes_count": 2,
            "replies": []
        }))
        .expect("comment");
        assert_eq!(comment.parent_id, Some(EntityId::Number(3)));
        assert_eq!(comment.author.display_name(), "demo");
    }

    #[test]
    fn listing_accepts_page_and_plain_shapes() {
        let page: Listing<u32> = serde_json::from_value(json!({
            "count": 12, "next": null, "previous": null, "results": [1, 2]
        }))
        .expect("page");
        assert_eq!(page.total(), 12);
        assert_eq!(page.next(), None);
        assert_eq!(page.into_items(), vec![1, 2]);

        let plain: Listing<u32> = serde_json::from_value(json!([4, 5, 6])).expect("plain");
        assert_eq!(plain.total(), 3);
        assert_eq!(plain.next(), None);

        let first: Listing<u32> = serde_json::from_value(json!({
            "count": 3, "next": "http://upstream/x/?page=2", "previous": null, "results": [1, 2]
        }))
        .expect("first page");
        assert_eq!(first.next(), Some("http://upstream/x/?page=2"));
    }

    #[test]
    fn pagination_rounds_pages_up() {
        let pagination = Pagination::new(2, 10, 21);
        assert_eq!(pagination.total_pages, 3);
        assert_eq!(Pagination::new(1, 0, 0).total_pages, 0);
    }
}
