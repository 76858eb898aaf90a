use super::auth::UserResponse;
use super::{with_session, ApiError, AppState};
use crate::blog::{BlogService, ProfileUpdate};
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use axum_extra::extract::WithRejection;

pub(crate) async fn get_profile(State(state): State<AppState>, jar: CookieJar) -> Response {
    with_session(&state, jar, |session| async move {
        let user = BlogService::new(&session)
            .current_user()
            .await
            .map_err(ApiError::mapper("Failed to load profile"))?;
        Ok::<_, ApiError>(Json(UserResponse { user }))
    })
    .await
}

pub(crate) async fn update_profile(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<ProfileUpdate>, ApiError>,
) -> Response {
    with_session(&state, jar, |session| async move {
        let user = BlogService::new(&session)
            .update_profile(&payload)
            .await
            .map_err(ApiError::mapper("Failed to update profile"))?;
        Ok::<_, ApiError>(Json(UserResponse { user }))
    })
    .await
}
