use super::auth::SuccessResponse;
use super::{with_session, ApiError, AppState};
use crate::blog::{BlogService, NewComment, NewPost, PostQuery, PostUpdate, ToggleKind};
use crate::models::{Comment, Post, PostPage};
use crate::thread::{self, ThreadEntry};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use axum_extra::extract::WithRejection;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub(crate) struct PostResponse {
    post: Post,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentsResponse {
    comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentCreatedResponse {
    success: bool,
    comment: Comment,
}

#[derive(Debug, Serialize)]
pub(crate) struct ThreadResponse {
    entries: Vec<ThreadEntry>,
}

pub(crate) async fn list_posts(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Query(query), _): WithRejection<Query<PostQuery>, ApiError>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let page: PostPage = BlogService::new(&session)
            .list_posts(&query)
            .await
            .map_err(ApiError::mapper("Failed to load posts"))?;
        Ok::<_, ApiError>(Json(page))
    })
    .await
}

pub(crate) async fn get_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let post = BlogService::new(&session)
            .get_post(&id)
            .await
            .map_err(ApiError::mapper("Failed to load post"))?;
        Ok::<_, ApiError>(Json(PostResponse { post }))
    })
    .await
}

pub(crate) async fn create_post(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<NewPost>, ApiError>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let post = BlogService::new(&session)
            .create_post(&payload)
            .await
            .map_err(ApiError::mapper("Failed to create post"))?;
        Ok::<_, ApiError>((StatusCode::CREATED, Json(PostResponse { post })))
    })
    .await
}

pub(crate) async fn update_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<PostUpdate>, ApiError>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let post = BlogService::new(&session)
            .update_post(&id, &payload)
            .await
            .map_err(ApiError::mapper("Failed to update post"))?;
        Ok::<_, ApiError>(Json(PostResponse { post }))
    })
    .await
}

pub(crate) async fn delete_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    with_session(&state, jar, |session| async move {
        BlogService::new(&session)
            .delete_post(&id)
            .await
            .map_err(ApiError::mapper("Failed to delete post"))?;
        Ok::<_, ApiError>(Json(SuccessResponse { success: true }))
    })
    .await
}

pub(crate) async fn toggle_like(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    toggle(state, jar, id, ToggleKind::Like, "Failed to like post").await
}

pub(crate) async fn toggle_bookmark(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    toggle(state, jar, id, ToggleKind::Bookmark, "Failed to bookmark post").await
}

pub(crate) async fn toggle_repost(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    toggle(state, jar, id, ToggleKind::Repost, "Failed to repost post").await
}

async fn toggle(
    state: AppState,
    jar: CookieJar,
    post_id: String,
    kind: ToggleKind,
    failure: &'static str,
) -> Response {
    with_session(&state, jar, |session| async move {
        let outcome = BlogService::new(&session)
            .toggle(&post_id, kind)
            .await
            .map_err(ApiError::mapper(failure))?;
        // {"success": true, "liked": false}
        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(true));
        body.insert(kind.state_field().into(), Value::Bool(outcome.active));
        Ok::<_, ApiError>(Json(Value::Object(body)))
    })
    .await
}

pub(crate) async fn list_comments(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let comments = BlogService::new(&session)
            .list_comments(&id)
            .await
            .map_err(ApiError::mapper("Failed to load comments"))?;
        Ok::<_, ApiError>(Json(CommentsResponse { comments }))
    })
    .await
}

pub(crate) async fn create_comment(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<NewComment>, ApiError>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let comment = BlogService::new(&session)
            .add_comment(&id, &payload)
            .await
            .map_err(ApiError::mapper("Failed to post comment"))?;
        tracing::info!(post_id = %id, comment_id = %comment.id, "comment posted");
        Ok::<_, ApiError>((
            StatusCode::CREATED,
            Json(CommentCreatedResponse {
                success: true,
                comment,
            }),
        ))
    })
    .await
}

pub(crate) async fn comment_thread(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let comments = BlogService::new(&session)
            .list_comments(&id)
            .await
            .map_err(ApiError::mapper("Failed to load comments"))?;
        let entries = thread::entries(&comments);
        Ok::<_, ApiError>(Json(ThreadResponse { entries }))
    })
    .await
}
