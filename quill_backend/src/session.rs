//! Credential state for one user.
//!
//! A [`Session`] is the only place that reads or mutates tokens. Where the
//! tokens live is up to the [`TokenStore`] behind it: cookies for requests
//! handled by the HTTP API, a file for the terminal client, memory for tests.

use crate::upstream::{UpstreamClient, UpstreamError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    fn store_pair(&self, pair: TokenPair);
    fn replace_access(&self, access: String);
    fn replace_refresh(&self, refresh: String);
    fn discard_access(&self);
    fn clear(&self);
}

/// Token state as held by in-process stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl StoredTokens {
    pub fn apply(&mut self, change: TokenChange) {
        match change {
            TokenChange::Pair(pair) => {
                self.access = Some(pair.access);
                self.refresh = Some(pair.refresh);
            }
            TokenChange::Access(access) => self.access = Some(access),
            TokenChange::Refresh(refresh) => self.refresh = Some(refresh),
            TokenChange::DiscardAccess => self.access = None,
            TokenChange::Clear => *self = StoredTokens::default(),
        }
    }
}

/// One mutation of a token store, used by stores that persist changes.
#[derive(Debug, Clone)]
pub enum TokenChange {
    Pair(TokenPair),
    Access(String),
    Refresh(String),
    DiscardAccess,
    Clear,
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new(tokens: StoredTokens) -> Self {
        Self {
            tokens: Mutex::new(tokens),
        }
    }

    pub fn with_pair(access: &str, refresh: &str) -> Self {
        Self::new(StoredTokens {
            access: Some(access.to_string()),
            refresh: Some(refresh.to_string()),
        })
    }

    pub fn snapshot(&self) -> StoredTokens {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply(&self, change: TokenChange) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(change);
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.snapshot().access
    }

    fn refresh_token(&self) -> Option<String> {
        self.snapshot().refresh
    }

    fn store_pair(&self, pair: TokenPair) {
        self.apply(TokenChange::Pair(pair));
    }

    fn replace_access(&self, access: String) {
        self.apply(TokenChange::Access(access));
    }

    fn replace_refresh(&self, refresh: String) {
        self.apply(TokenChange::Refresh(refresh));
    }

    fn discard_access(&self) {
        self.apply(TokenChange::DiscardAccess);
    }

    fn clear(&self) {
        self.apply(TokenChange::Clear);
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingToken,
    #[error("refresh token rejected by upstream ({0})")]
    Rejected(StatusCode),
    #[error(transparent)]
    Upstream(UpstreamError),
}

#[derive(Clone)]
pub struct Session {
    store: Arc<dyn TokenStore>,
    upstream: UpstreamClient,
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>, upstream: UpstreamClient) -> Self {
        Self { store, upstream }
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token().filter(|token| !token.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn establish(&self, pair: TokenPair) {
        self.store.store_pair(pair);
    }

    pub fn discard_access(&self) {
        self.store.discard_access();
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Mints a new access token from the stored refresh token.
    ///
    /// A missing or rejected refresh token clears the whole session. When the
    /// upstream cannot be reached or fails on its own (5xx) the refresh token
    /// is kept for a later attempt, but the access token that triggered the
    /// refresh is dropped.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let Some(refresh) = self.store.refresh_token().filter(|t| !t.is_empty()) else {
            self.store.clear();
            return Err(RefreshError::MissingToken);
        };

        match self.upstream.refresh_access(&refresh).await {
            Ok(tokens) => {
                self.store.replace_access(tokens.access.clone());
                if let Some(rotated) = tokens.refresh {
                    self.store.replace_refresh(rotated);
                }
                tracing::debug!("access token refreshed");
                Ok(tokens.access)
            }
            Err(UpstreamError::Status { status, .. }) if refresh_rejected(status) => {
                tracing::warn!(status = status.as_u16(), "refresh token rejected, clearing session");
                self.store.clear();
                Err(RefreshError::Rejected(status))
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed");
                self.store.discard_access();
                Err(RefreshError::Upstream(err))
            }
        }
    }
}

/// Statuses with which the refresh endpoint says the token itself is bad.
fn refresh_rejected(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_tracks_changes() {
        let store = MemoryTokenStore::default();
        assert_eq!(store.access_token(), None);

        store.store_pair(TokenPair {
            access: "a1".into(),
            refresh: "r1".into(),
        });
        store.replace_access("a2".into());
        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));

        store.discard_access();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));

        store.clear();
        assert_eq!(store.snapshot(), StoredTokens::default());
    }

    #[test]
    fn only_client_errors_reject_a_refresh_token() {
        assert!(refresh_rejected(StatusCode::UNAUTHORIZED));
        assert!(refresh_rejected(StatusCode::BAD_REQUEST));
        assert!(refresh_rejected(StatusCode::FORBIDDEN));
        assert!(!refresh_rejected(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!refresh_rejected(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
