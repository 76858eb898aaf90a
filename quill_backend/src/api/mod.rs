mod auth;
mod comments;
pub mod cookies;
mod posts;
mod users;

use crate::blog::BlogError;
use crate::config::QuillConfig;
use crate::session::Session;
use crate::upstream::{UpstreamClient, UpstreamError};
use anyhow::{Context, Result};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use cookies::CookieTokenStore;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: QuillConfig,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(config: QuillConfig) -> Result<Self> {
        let upstream =
            UpstreamClient::new(&config.upstream).context("failed to build upstream HTTP client")?;
        Ok(Self { config, upstream })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    /// Upstream failure; the message is what the client sees, the cause is
    /// only logged.
    #[error("{message}")]
    Upstream {
        message: String,
        cause: Option<UpstreamError>,
    },
}

impl ApiError {
    fn into_response_parts(self) -> (StatusCode, ErrorResponse) {
        let status = match &self {
            ApiError::Unauthenticated | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Upstream { message, cause } => {
                tracing::error!(error = ?cause, %message, "upstream failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            ErrorResponse {
                success: false,
                error: self.to_string(),
            },
        )
    }

    /// Maps a service error, using `failure` as the message for anything the
    /// upstream got wrong.
    pub(crate) fn from_blog(err: BlogError, failure: &str) -> Self {
        match err {
            BlogError::Unauthenticated => ApiError::Unauthenticated,
            BlogError::InvalidCredentials => ApiError::InvalidCredentials,
            BlogError::InvalidInput(msg) | BlogError::Rejected(msg) => ApiError::BadRequest(msg),
            BlogError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            BlogError::Forbidden(msg) => ApiError::Forbidden(msg),
            BlogError::Upstream(cause) => ApiError::Upstream {
                message: failure.to_string(),
                cause: Some(cause),
            },
        }
    }

    pub(crate) fn mapper(failure: &'static str) -> impl Fn(BlogError) -> ApiError {
        move |err| ApiError::from_blog(err, failure)
    }
}

// Malformed bodies and query strings get the same envelope as every other
// validation failure instead of axum's plain-text rejections.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "rejected request body");
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_response_parts();
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Runs `handler` with a session backed by the request's cookies and attaches
/// whatever the session changed to the response, on success and on failure
/// alike.
pub(crate) async fn with_session<F, Fut, R>(state: &AppState, jar: CookieJar, handler: F) -> Response
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<R, ApiError>>,
    R: IntoResponse,
{
    let store = Arc::new(CookieTokenStore::from_jar(&jar));
    let session = Session::new(store.clone(), state.upstream.clone());
    let outcome = handler(session).await;
    let jar = store.write_to(jar, &state.config.cookies);
    match outcome {
        Ok(body) => (jar, body).into_response(),
        Err(err) => (jar, err).into_response(),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    upstream: String,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        upstream: state.upstream.base_url().to_string(),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/signin", post(auth::sign_in))
        .route("/api/auth/signup", post(auth::sign_up))
        .route("/api/auth/signout", post(auth::sign_out))
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/api/posts", get(posts::list_posts).post(posts::create_post))
        .route(
            "/api/posts/:id",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/api/posts/:id/like", post(posts::toggle_like))
        .route("/api/posts/:id/bookmark", post(posts::toggle_bookmark))
        .route("/api/posts/:id/repost", post(posts::toggle_repost))
        .route(
            "/api/posts/:id/comments",
            get(posts::list_comments).post(posts::create_comment),
        )
        .route("/api/posts/:id/thread", get(posts::comment_thread))
        .route(
            "/api/comments/:id",
            put(comments::update_comment).delete(comments::delete_comment),
        )
        .route("/api/comments/:id/like", post(comments::like_comment))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serves the API on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(?addr, upstream = %state.upstream.base_url(), "HTTP server listening");
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

pub async fn serve_http(config: QuillConfig) -> Result<()> {
    let addr = SocketAddr::new(config.bind_addr, config.api_port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let state = AppState::new(config)?;
    serve(listener, state).await
}
