use super::{with_session, ApiError, AppState};
use crate::blog::{BlogService, SignUpInput};
use crate::models::User;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct SignInRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignInResponse {
    success: bool,
    user: User,
}

#[derive(Debug, Serialize)]
pub(crate) struct SuccessResponse {
    pub(crate) success: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) user: User,
}

pub(crate) async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<SignInRequest>, ApiError>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let user = BlogService::new(&session)
            .sign_in(&payload.username, &payload.password)
            .await
            .map_err(ApiError::mapper("Failed to sign in"))?;
        Ok::<_, ApiError>(Json(SignInResponse {
            success: true,
            user,
        }))
    })
    .await
}

pub(crate) async fn sign_up(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<SignUpInput>, ApiError>,
) -> Response {
    with_session(&state, jar, |session| async move {
        BlogService::new(&session)
            .sign_up(&payload)
            .await
            .map_err(ApiError::mapper("Failed to sign up"))?;
        Ok::<_, ApiError>((StatusCode::CREATED, Json(SuccessResponse { success: true })))
    })
    .await
}

pub(crate) async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> Response {
    with_session(&state, jar, |session| async move {
        BlogService::new(&session).sign_out();
        Ok::<_, ApiError>(Json(SuccessResponse { success: true }))
    })
    .await
}

pub(crate) async fn me(State(state): State<AppState>, jar: CookieJar) -> Response {
    with_session(&state, jar, |session| async move {
        let user = BlogService::new(&session)
            .current_user()
            .await
            .map_err(ApiError::mapper("Failed to load user"))?;
        Ok::<_, ApiError>(Json(UserResponse { user }))
    })
    .await
}
