use quill_backend::config::UpstreamConfig;
use quill_backend::gateway::{AuthGateway, GatewayError};
use quill_backend::session::{MemoryTokenStore, Session, StoredTokens};
use quill_backend::upstream::{UpstreamClient, UpstreamRequest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_for(server: &MockServer, store: Arc<MemoryTokenStore>) -> Session {
    let config = UpstreamConfig::new(server.uri()).expect("upstream config");
    let upstream = UpstreamClient::new(&config).expect("upstream client");
    Session::new(store, upstream)
}

fn me_request() -> UpstreamRequest {
    UpstreamRequest::get("/blog/me/")
}

#[tokio::test]
async fn missing_access_token_never_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a2"})))
        .expect(0)
        .mount(&server)
        .await;

    // A refresh token alone does not authenticate a request.
    let store = Arc::new(MemoryTokenStore::new(StoredTokens {
        access: None,
        refresh: Some("r1".into()),
    }));
    let session = session_for(&server, store);
    let result = AuthGateway::new(&session).execute(me_request()).await;
    assert!(matches!(result, Err(GatewayError::Unauthenticated)));
}

#[tokio::test]
async fn valid_token_is_attached_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "username": "demo"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_pair("a1", "r1"));
    let session = session_for(&server, store.clone());
    let response = AuthGateway::new(&session)
        .execute(me_request())
        .await
        .expect("authenticated call");
    assert_eq!(response.body["username"], "demo");
    assert_eq!(store.snapshot().access.as_deref(), Some("a1"));
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_replayed_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .and(body_json(json!({"refresh": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a2"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "username": "demo"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_pair("a1", "r1"));
    let session = session_for(&server, store.clone());
    let response = AuthGateway::new(&session)
        .execute(me_request())
        .await
        .expect("replayed call");
    assert_eq!(response.status.as_u16(), 200);

    // The refreshed token is what later requests see.
    assert_eq!(
        store.snapshot(),
        StoredTokens {
            access: Some("a2".into()),
            refresh: Some("r1".into()),
        }
    );
}

#[tokio::test]
async fn replayed_request_is_not_retried_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a2"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_pair("a1", "r1"));
    let session = session_for(&server, store.clone());
    let result = AuthGateway::new(&session).execute(me_request()).await;
    assert!(matches!(result, Err(GatewayError::Unauthenticated)));

    // The rejected access token is not kept around.
    assert_eq!(store.snapshot().access, None);
    assert_eq!(store.snapshot().refresh.as_deref(), Some("r1"));
}

#[tokio::test]
async fn rejected_refresh_token_clears_session_without_looping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Token is invalid or expired"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_pair("a1", "bad-refresh"));
    let session = session_for(&server, store.clone());
    let result = AuthGateway::new(&session).execute(me_request()).await;
    assert!(matches!(result, Err(GatewayError::Unauthenticated)));
    assert_eq!(store.snapshot(), StoredTokens::default());
}

#[tokio::test]
async fn rotated_refresh_token_is_stored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "a2", "refresh": "r2"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "username": "demo"})))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_pair("a1", "r1"));
    let session = session_for(&server, store.clone());
    AuthGateway::new(&session)
        .execute(me_request())
        .await
        .expect("replayed call");
    assert_eq!(store.snapshot().refresh.as_deref(), Some("r2"));
}

#[tokio::test]
async fn non_auth_failures_are_returned_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "a2"})))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_pair("a1", "r1"));
    let session = session_for(&server, store.clone());
    let response = AuthGateway::new(&session)
        .execute(me_request())
        .await
        .expect("response is relayed");
    assert_eq!(response.status.as_u16(), 500);
    assert_eq!(store.snapshot().access.as_deref(), Some("a1"));
}

#[tokio::test]
async fn unavailable_refresh_endpoint_keeps_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::with_pair("a1", "r1"));
    let session = session_for(&server, store.clone());
    let result = AuthGateway::new(&session).execute(me_request()).await;
    assert!(matches!(result, Err(GatewayError::Upstream(_))));
    // The refresh token was never judged, so it survives for the next call.
    assert_eq!(store.snapshot().access, None);
    assert_eq!(store.snapshot().refresh.as_deref(), Some("r1"));
}

#[tokio::test]
async fn refresh_transport_failure_keeps_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/me/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "a2"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = UpstreamConfig::new(server.uri()).expect("upstream config");
    config.timeout = Duration::from_millis(300);
    let upstream = UpstreamClient::new(&config).expect("upstream client");
    let store = Arc::new(MemoryTokenStore::with_pair("a1", "r1"));
    let session = Session::new(store.clone(), upstream);

    let result = AuthGateway::new(&session).execute(me_request()).await;
    assert!(matches!(result, Err(GatewayError::Upstream(_))));
    assert_eq!(store.snapshot().access, None);
    assert_eq!(store.snapshot().refresh.as_deref(), Some("r1"));
}
