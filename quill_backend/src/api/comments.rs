use super::auth::SuccessResponse;
use super::{with_session, ApiError, AppState};
use crate::blog::{BlogService, CommentUpdate};
use crate::models::Comment;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use axum_extra::extract::WithRejection;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct CommentResponse {
    comment: Comment,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentLikeResponse {
    success: bool,
    liked: bool,
}

pub(crate) async fn update_comment(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<CommentUpdate>, ApiError>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let comment = BlogService::new(&session)
            .update_comment(&id, &payload)
            .await
            .map_err(ApiError::mapper("Failed to update comment"))?;
        Ok::<_, ApiError>(Json(CommentResponse { comment }))
    })
    .await
}

pub(crate) async fn delete_comment(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    with_session(&state, jar, |session| async move {
        BlogService::new(&session)
            .delete_comment(&id)
            .await
            .map_err(ApiError::mapper("Failed to delete comment"))?;
        Ok::<_, ApiError>(Json(SuccessResponse { success: true }))
    })
    .await
}

/// Comment likes only ever add; a repeat like still answers `liked: true`.
pub(crate) async fn like_comment(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let newly_liked = BlogService::new(&session)
            .like_comment(&id)
            .await
            .map_err(ApiError::mapper("Failed to like comment"))?;
        tracing::debug!(comment_id = %id, newly_liked, "comment like relayed");
        Ok::<_, ApiError>(Json(CommentLikeResponse {
            success: true,
            liked: true,
        }))
    })
    .await
}
