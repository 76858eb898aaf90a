//! HTTP client for the external blog API.
//!
//! Every call the rest of the crate makes to the upstream goes through
//! [`UpstreamClient::send`]. The client never interprets status codes itself;
//! the auth gateway and the service layer decide what a 401 or a 404 means.

use crate::config::UpstreamConfig;
use crate::utils::user_agent;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream responded with {status}")]
    Status { status: StatusCode, body: Value },
    #[error("unexpected upstream payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl UpstreamError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Transport(err) => err.status(),
            UpstreamError::Payload(_) => None,
        }
    }
}

/// Description of one outbound call, replayable by the gateway.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl UpstreamRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, UpstreamError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn into_success(self) -> Result<Value, UpstreamError> {
        if self.status.is_success() {
            Ok(self.body)
        } else {
            Err(UpstreamError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T, UpstreamError> {
        let body = self.into_success()?;
        Ok(T::deserialize(serde_stacker::Deserializer::new(body))?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    /// Present when the upstream rotates refresh tokens.
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Clone)]
pub struct UpstreamClient {
    base_url: String,
    client: Client,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send(
        &self,
        request: &UpstreamRequest,
        bearer: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body = parse_body(&text);
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            "upstream call finished"
        );
        Ok(UpstreamResponse { status, body })
    }

    /// Exchanges a refresh token for a new access token.
    pub async fn refresh_access(&self, refresh: &str) -> Result<RefreshedTokens, UpstreamError> {
        let request =
            UpstreamRequest::post("/api/token/refresh/").json(&serde_json::json!({ "refresh": refresh }))?;
        self.send(&request, None).await?.decode()
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    parse_json(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Comment threads nest arbitrarily deep, so the parser's recursion limit is
/// lifted and the stack grows on demand instead.
fn parse_json(text: &str) -> Result<Value, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_str(text);
    de.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}
