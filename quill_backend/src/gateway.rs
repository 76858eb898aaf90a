use crate::session::{RefreshError, Session};
use crate::upstream::{UpstreamError, UpstreamRequest, UpstreamResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Issues authenticated upstream calls on behalf of a [`Session`].
///
/// A call is attempted with the stored access token. On a 401 the session is
/// refreshed once and the call replayed once with the new token; a second 401
/// ends the call as unauthenticated. Nothing is ever replayed twice.
pub struct AuthGateway<'a> {
    session: &'a Session,
}

impl<'a> AuthGateway<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, GatewayError> {
        let Some(token) = self.session.access_token() else {
            tracing::debug!(path = request.path(), "no access token, skipping upstream call");
            return Err(GatewayError::Unauthenticated);
        };

        let upstream = self.session.upstream();
        let response = upstream.send(&request, Some(&token)).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::debug!(path = request.path(), "access token rejected, refreshing");
        let fresh = match self.session.refresh().await {
            Ok(token) => token,
            Err(RefreshError::Upstream(err)) => return Err(GatewayError::Upstream(err)),
            Err(err) => {
                tracing::warn!(path = request.path(), error = %err, "session ended");
                return Err(GatewayError::Unauthenticated);
            }
        };

        let replayed = upstream.send(&request, Some(&fresh)).await?;
        if replayed.is_unauthorized() {
            tracing::warn!(
                path = request.path(),
                "refreshed token rejected as well, giving up"
            );
            self.session.discard_access();
            return Err(GatewayError::Unauthenticated);
        }
        Ok(replayed)
    }
}
