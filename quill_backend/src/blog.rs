//! Blog operations shared by the HTTP API and the terminal client.
//!
//! Every operation maps to exactly one upstream endpoint (plus, for
//! authenticated calls, whatever refresh the gateway performs).

use crate::gateway::{AuthGateway, GatewayError};
use crate::models::{Comment, Listing, Pagination, Post, PostPage, ToggleReply, User};
use crate::session::{Session, TokenPair};
use crate::thread;
use crate::upstream::{UpstreamError, UpstreamRequest, UpstreamResponse};
use crate::utils::is_path_safe_id;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;
/// Upper bound on comment pages fetched for one post.
const MAX_COMMENT_PAGES: u32 = 1_000;

#[derive(Debug, Error)]
pub enum BlogError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("{0}")]
    InvalidInput(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Upstream(UpstreamError),
}

impl From<GatewayError> for BlogError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unauthenticated => BlogError::Unauthenticated,
            GatewayError::Upstream(err) => BlogError::Upstream(err),
        }
    }
}

impl From<UpstreamError> for BlogError {
    fn from(err: UpstreamError) -> Self {
        BlogError::Upstream(err)
    }
}

pub type BlogResult<T> = Result<T, BlogError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleKind {
    Like,
    Bookmark,
    Repost,
}

impl ToggleKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            ToggleKind::Like => "like",
            ToggleKind::Bookmark => "bookmark",
            ToggleKind::Repost => "repost",
        }
    }

    /// The `detail` string the upstream answers with when the toggle removed
    /// the user's like/bookmark/repost.
    pub fn removed_sentinel(self) -> &'static str {
        match self {
            ToggleKind::Like => "Unliked",
            ToggleKind::Bookmark => "Bookmark removed",
            ToggleKind::Repost => "Repost removed",
        }
    }

    /// Name of the boolean field in the client-facing envelope.
    pub fn state_field(self) -> &'static str {
        match self {
            ToggleKind::Like => "liked",
            ToggleKind::Bookmark => "bookmarked",
            ToggleKind::Repost => "reposted",
        }
    }

    pub fn is_removal(self, reply: &ToggleReply) -> bool {
        matches!(&reply.detail, Value::String(detail) if detail == self.removed_sentinel())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub kind: ToggleKind,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpInput {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.bio.is_none() && self.avatar_url.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default, alias = "limit")]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub published: bool,
}

fn default_true() -> bool {
    true
}

/// Partial edit of a post; absent fields are left alone upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

impl PostUpdate {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.excerpt.is_none()
            && self.tags.is_none()
            && self.published.is_none()
    }

    fn blanks_required_field(&self) -> bool {
        [&self.title, &self.content]
            .into_iter()
            .any(|field| field.as_deref().is_some_and(|v| v.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentUpdate {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "parentId", alias = "parent")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignInReply {
    access: String,
    refresh: String,
    user: User,
}

#[derive(Debug, Deserialize)]
struct SignUpReply {
    access: String,
    refresh: String,
}

/// Blog operations bound to one session.
pub struct BlogService<'a> {
    session: &'a Session,
}

impl<'a> BlogService<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    fn gateway(&self) -> AuthGateway<'a> {
        AuthGateway::new(self.session)
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> BlogResult<User> {
        let username = required(username, "Username and password are required")?;
        let password = required(password, "Username and password are required")?;
        let request = UpstreamRequest::post("/blog/signin/").json(&serde_json::json!({
            "username": username,
            "password": password,
        }))?;
        let response = self.session.upstream().send(&request, None).await?;
        if matches!(response.status, StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST) {
            tracing::info!(%username, "sign-in rejected");
            return Err(BlogError::InvalidCredentials);
        }
        let reply: SignInReply = response.decode()?;
        self.session.establish(TokenPair {
            access: reply.access,
            refresh: reply.refresh,
        });
        tracing::info!(username = %reply.user.username, "signed in");
        Ok(reply.user)
    }

    pub async fn sign_up(&self, input: &SignUpInput) -> BlogResult<()> {
        for (value, field) in [
            (&input.email, "email"),
            (&input.username, "username"),
            (&input.password, "password"),
        ] {
            if value.trim().is_empty() {
                return Err(BlogError::InvalidInput(format!("{field} is required")));
            }
        }
        let request = UpstreamRequest::post("/blog/signup/").json(input)?;
        let response = self.session.upstream().send(&request, None).await?;
        if response.status == StatusCode::BAD_REQUEST {
            return Err(BlogError::Rejected("Failed to sign up".into()));
        }
        let reply: SignUpReply = response.decode()?;
        self.session.establish(TokenPair {
            access: reply.access,
            refresh: reply.refresh,
        });
        tracing::info!(username = %input.username, "signed up");
        Ok(())
    }

    pub fn sign_out(&self) {
        self.session.clear();
    }

    pub async fn current_user(&self) -> BlogResult<User> {
        let response = self.gateway().execute(UpstreamRequest::get("/blog/me/")).await?;
        Ok(response.decode()?)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> BlogResult<User> {
        if update.is_empty() {
            return Err(BlogError::InvalidInput("Nothing to update".into()));
        }
        let request = UpstreamRequest::put("/blog/me/").json(update)?;
        let response = self.gateway().execute(request).await?;
        if response.status == StatusCode::BAD_REQUEST {
            return Err(BlogError::Rejected("Profile update rejected".into()));
        }
        Ok(response.decode()?)
    }

    pub async fn list_posts(&self, query: &PostQuery) -> BlogResult<PostPage> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let mut request = UpstreamRequest::get("/blog/posts/")
            .query("page", page)
            .query("page_size", limit);
        if let Some(author) = author_filter(query.author.as_deref())? {
            request = request.query("author", author);
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            request = request.query("search", search.trim());
        }

        let response = self.session.upstream().send(&request, None).await?;
        if response.status == StatusCode::NOT_FOUND {
            // Pages past the end are a 404 upstream.
            return Ok(PostPage {
                posts: Vec::new(),
                pagination: Pagination::new(page, limit, 0),
            });
        }
        let listing: Listing<Post> = response.decode()?;
        let total = listing.total();
        Ok(PostPage {
            posts: listing.into_items(),
            pagination: Pagination::new(page, limit, total),
        })
    }

    pub async fn get_post(&self, post_id: &str) -> BlogResult<Post> {
        let post_id = checked_id(post_id, "post")?;
        let request = UpstreamRequest::get(format!("/blog/posts/{post_id}/"));
        let response = self.session.upstream().send(&request, None).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(BlogError::NotFound("Post".into()));
        }
        Ok(response.decode()?)
    }

    pub async fn create_post(&self, post: &NewPost) -> BlogResult<Post> {
        if post.title.trim().is_empty() || post.content.trim().is_empty() {
            return Err(BlogError::InvalidInput(
                "Title and content are required".into(),
            ));
        }
        let request = UpstreamRequest::post("/blog/posts/").json(post)?;
        let response = self.gateway().execute(request).await?;
        if response.status == StatusCode::BAD_REQUEST {
            return Err(BlogError::Rejected("Post rejected".into()));
        }
        Ok(response.decode()?)
    }

    pub async fn toggle(&self, post_id: &str, kind: ToggleKind) -> BlogResult<ToggleOutcome> {
        let post_id = checked_id(post_id, "post")?;
        let request =
            UpstreamRequest::post(format!("/blog/posts/{post_id}/{}/", kind.endpoint()))
                .json(&serde_json::json!({}))?;
        let response = self.gateway().execute(request).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(BlogError::NotFound("Post".into()));
        }
        let reply: ToggleReply = response.decode()?;
        let active = !kind.is_removal(&reply);
        tracing::debug!(%post_id, kind = kind.endpoint(), active, "toggle relayed");
        Ok(ToggleOutcome { kind, active })
    }

    /// Fetches every page of a post's comments and reduces them to the
    /// top-level forest.
    pub async fn list_comments(&self, post_id: &str) -> BlogResult<Vec<Comment>> {
        let post_id = checked_id(post_id, "post")?;
        let mut comments = Vec::new();
        let mut page = 1;
        loop {
            let request = UpstreamRequest::get(format!("/blog/posts/{post_id}/comments/"))
                .query("page", page)
                .query("page_size", MAX_PAGE_SIZE);
            let response = self.session.upstream().send(&request, None).await?;
            if response.status == StatusCode::NOT_FOUND {
                if page == 1 {
                    return Err(BlogError::NotFound("Post".into()));
                }
                // The page vanished between requests; keep what we have.
                break;
            }
            let listing: Listing<Comment> = response.decode()?;
            let more = listing.next().is_some();
            comments.extend(listing.into_items());
            if !more {
                break;
            }
            if page >= MAX_COMMENT_PAGES {
                tracing::warn!(%post_id, pages = page, "comment listing truncated");
                break;
            }
            page += 1;
        }
        tracing::debug!(%post_id, pages = page, fetched = comments.len(), "comments loaded");
        Ok(thread::top_level(comments))
    }

    pub async fn add_comment(&self, post_id: &str, comment: &NewComment) -> BlogResult<Comment> {
        let post_id = checked_id(post_id, "post")?;
        let content = required(&comment.content, "Comment content is required")?;
        let parent = match comment.parent_id.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(parent) => Some(checked_id(parent, "parent comment")?),
            None => None,
        };
        let request = UpstreamRequest::post(format!("/blog/posts/{post_id}/comments/")).json(
            &serde_json::json!({
                "content": content,
                "parent": parent,
            }),
        )?;
        let response = self.gateway().execute(request).await?;
        match response.status {
            StatusCode::NOT_FOUND => Err(BlogError::NotFound("Post".into())),
            StatusCode::BAD_REQUEST => Err(BlogError::Rejected("Comment rejected".into())),
            _ => Ok(response.decode()?),
        }
    }

    pub async fn update_post(&self, post_id: &str, update: &PostUpdate) -> BlogResult<Post> {
        let post_id = checked_id(post_id, "post")?;
        if update.is_empty() {
            return Err(BlogError::InvalidInput("Nothing to update".into()));
        }
        if update.blanks_required_field() {
            return Err(BlogError::InvalidInput(
                "Title and content cannot be empty".into(),
            ));
        }
        let request = UpstreamRequest::put(format!("/blog/posts/{post_id}/")).json(update)?;
        let response = self.gateway().execute(request).await?;
        Ok(author_only(response, "Post")?.decode()?)
    }

    pub async fn delete_post(&self, post_id: &str) -> BlogResult<()> {
        let post_id = checked_id(post_id, "post")?;
        let request = UpstreamRequest::delete(format!("/blog/posts/{post_id}/"));
        let response = self.gateway().execute(request).await?;
        author_only(response, "Post")?.into_success()?;
        tracing::info!(%post_id, "post deleted");
        Ok(())
    }

    pub async fn update_comment(
        &self,
        comment_id: &str,
        update: &CommentUpdate,
    ) -> BlogResult<Comment> {
        let comment_id = checked_id(comment_id, "comment")?;
        let content = required(&update.content, "Comment content is required")?;
        let request = UpstreamRequest::put(format!("/blog/comments/{comment_id}/"))
            .json(&serde_json::json!({ "content": content }))?;
        let response = self.gateway().execute(request).await?;
        Ok(author_only(response, "Comment")?.decode()?)
    }

    pub async fn delete_comment(&self, comment_id: &str) -> BlogResult<()> {
        let comment_id = checked_id(comment_id, "comment")?;
        let request = UpstreamRequest::delete(format!("/blog/comments/{comment_id}/"));
        let response = self.gateway().execute(request).await?;
        author_only(response, "Comment")?.into_success()?;
        tracing::info!(%comment_id, "comment deleted");
        Ok(())
    }

    /// Likes a comment. Unlike posts this is not a toggle upstream: a repeat
    /// like is answered with 400 "Already liked", which is reported as
    /// `Ok(false)` since the comment ends up liked either way.
    pub async fn like_comment(&self, comment_id: &str) -> BlogResult<bool> {
        let comment_id = checked_id(comment_id, "comment")?;
        let request = UpstreamRequest::post(format!("/blog/comments/{comment_id}/like/"))
            .json(&serde_json::json!({}))?;
        let response = self.gateway().execute(request).await?;
        match response.status {
            StatusCode::NOT_FOUND => Err(BlogError::NotFound("Comment".into())),
            StatusCode::BAD_REQUEST if is_already_liked(&response.body) => Ok(false),
            StatusCode::BAD_REQUEST => Err(BlogError::Rejected("Like rejected".into())),
            _ => {
                response.into_success()?;
                Ok(true)
            }
        }
    }
}

/// Statuses of endpoints only the author of a post or comment may call.
fn author_only(response: UpstreamResponse, what: &str) -> BlogResult<UpstreamResponse> {
    match response.status {
        StatusCode::NOT_FOUND => Err(BlogError::NotFound(what.to_string())),
        StatusCode::FORBIDDEN => Err(BlogError::Forbidden(format!(
            "Only the author can change this {}",
            what.to_lowercase()
        ))),
        StatusCode::BAD_REQUEST => Err(BlogError::Rejected(format!("{what} update rejected"))),
        _ => Ok(response),
    }
}

/// The upstream filters posts by `author__id`, so only numeric ids narrow
/// the listing.
fn author_filter(author: Option<&str>) -> BlogResult<Option<&str>> {
    match author.map(str::trim).filter(|a| !a.is_empty()) {
        None => Ok(None),
        Some(id) if id.bytes().all(|b| b.is_ascii_digit()) => Ok(Some(id)),
        Some(_) => Err(BlogError::InvalidInput(
            "author must be a numeric user id".into(),
        )),
    }
}

fn is_already_liked(body: &Value) -> bool {
    matches!(body.get("detail"), Some(Value::String(detail)) if detail == "Already liked")
}

fn required<'v>(value: &'v str, message: &str) -> BlogResult<&'v str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BlogError::InvalidInput(message.to_string()));
    }
    Ok(trimmed)
}

fn checked_id<'v>(id: &'v str, what: &str) -> BlogResult<&'v str> {
    let id = id.trim();
    if !is_path_safe_id(id) {
        return Err(BlogError::InvalidInput(format!("invalid {what} id")));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn toggle_sentinels_mark_removal() {
        let removed = ToggleReply {
            detail: json!("Unliked"),
        };
        let added = ToggleReply {
            detail: json!({"id": 3, "object_id": 1}),
        };
        assert!(ToggleKind::Like.is_removal(&removed));
        assert!(!ToggleKind::Like.is_removal(&added));
        assert!(!ToggleKind::Bookmark.is_removal(&removed));
        assert!(ToggleKind::Bookmark.is_removal(&ToggleReply {
            detail: json!("Bookmark removed")
        }));
        assert!(ToggleKind::Repost.is_removal(&ToggleReply {
            detail: json!("Repost removed")
        }));
    }

    #[test]
    fn new_comment_accepts_client_field_names() {
        let comment: NewComment =
            serde_json::from_value(json!({"content": "hi", "parentId": "4"})).expect("comment");
        assert_eq!(comment.parent_id.as_deref(), Some("4"));
    }

    #[test]
    fn ids_are_checked_before_use() {
        assert!(checked_id("12", "post").is_ok());
        assert!(matches!(
            checked_id("../me", "post"),
            Err(BlogError::InvalidInput(_))
        ));
    }

    #[test]
    fn author_filter_is_a_user_id() {
        assert_eq!(author_filter(None).ok(), Some(None));
        assert_eq!(author_filter(Some("  ")).ok(), Some(None));
        assert_eq!(author_filter(Some(" 42 ")).ok(), Some(Some("42")));
        assert!(matches!(
            author_filter(Some("demo")),
            Err(BlogError::InvalidInput(_))
        ));
    }

    #[test]
    fn post_update_rejects_blank_required_fields() {
        assert!(PostUpdate::default().is_empty());
        let retitle = PostUpdate {
            title: Some("New title".into()),
            ..PostUpdate::default()
        };
        assert!(!retitle.is_empty());
        assert!(!retitle.blanks_required_field());
        assert_eq!(
            serde_json::to_value(&retitle).expect("serialize"),
            json!({"title": "New title"})
        );

        let blanked = PostUpdate {
            content: Some("  ".into()),
            ..PostUpdate::default()
        };
        assert!(blanked.blanks_required_field());
    }

    #[test]
    fn author_only_endpoints_map_forbidden() {
        let response = UpstreamResponse {
            status: StatusCode::FORBIDDEN,
            body: json!({"detail": "Not allowed"}),
        };
        assert!(matches!(
            author_only(response, "Post"),
            Err(BlogError::Forbidden(msg)) if msg == "Only the author can change this post"
        ));
        assert!(is_already_liked(&json!({"detail": "Already liked"})));
        assert!(!is_already_liked(&json!({"content": ["This field is required."]})));
    }
}
