//! REST calls against the conversation backend: listing and creating
//! conversations, snapshot load, message submission, and the first-turn
//! trigger.
//!
//! ERROR HANDLING
//! ==============
//! Failures are classified by status only: 404 is `NotFound`, 401/403 (or a
//! credential provider failure) is `Unauthorized`, and everything else
//! (network errors, other non-2xx, undecodable bodies) is `Transport`.
//! Callers decide which of these are fatal.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use wire::{Conversation, ConversationDetail, CreateConversationRequest, SubmitRequest};

use super::credentials::CredentialProvider;
use crate::config::ClientConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("conversation not found")]
    NotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl ApiError {
    /// Classify a non-success status.
    #[must_use]
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized(error_detail(status, body)),
            _ => Self::Transport(error_detail(status, body)),
        }
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::from_status(status, ""),
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Pull `detail` or `error` out of a JSON error body; fall back to the status.
fn error_detail(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        ["detail", "error", "message"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str))
    });
    match message {
        Some(message) => format!("HTTP {}: {message}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}

/// The REST boundary the view depends on.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// `GET {prefix}/conversations`: the caller's conversations.
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    /// `POST {prefix}/conversations`. The server stores `content` as the
    /// opening user message; no agent runs until the first-turn trigger.
    async fn create_conversation(&self, request: &CreateConversationRequest) -> Result<Conversation, ApiError>;

    /// `GET {prefix}/conversations/{id}`.
    async fn fetch_conversation(&self, conversation_id: &str) -> Result<ConversationDetail, ApiError>;

    /// `POST {prefix}/conversations/{id}/messages`. The body of the
    /// acknowledgment is opaque.
    async fn submit_message(&self, conversation_id: &str, request: &SubmitRequest) -> Result<Value, ApiError>;

    /// `POST {prefix}/conversations/{id}/trigger-first-message`.
    async fn trigger_first_message(&self, conversation_id: &str) -> Result<Value, ApiError>;
}

/// [`ConversationApi`] over HTTP with a bearer token.
pub struct HttpApi {
    http: reqwest::Client,
    config: ClientConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpApi {
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config, credentials })
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let token = self
            .credentials
            .token()
            .await
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
        let url = self.config.api_url(path);

        let request = self.http.request(method.clone(), &url).bearer_auth(token);
        let request = match body {
            Some(json) => request.json(&json),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let error = ApiError::from_status(status, &text);
            tracing::debug!(%method, %url, error = %error, "request failed");
            return Err(error);
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Transport(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl ConversationApi for HttpApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let body = self.send(reqwest::Method::GET, "/conversations", None).await?;
        serde_json::from_value(body).map_err(|e| ApiError::Transport(format!("invalid conversation list: {e}")))
    }

    async fn create_conversation(&self, request: &CreateConversationRequest) -> Result<Conversation, ApiError> {
        let body = serde_json::to_value(request).map_err(|e| ApiError::Transport(e.to_string()))?;
        let created = self.send(reqwest::Method::POST, "/conversations", Some(body)).await?;
        serde_json::from_value(created).map_err(|e| ApiError::Transport(format!("invalid conversation: {e}")))
    }

    async fn fetch_conversation(&self, conversation_id: &str) -> Result<ConversationDetail, ApiError> {
        let path = format!("/conversations/{conversation_id}");
        let body = self.send(reqwest::Method::GET, &path, None).await?;
        serde_json::from_value(body).map_err(|e| ApiError::Transport(format!("invalid snapshot: {e}")))
    }

    async fn submit_message(&self, conversation_id: &str, request: &SubmitRequest) -> Result<Value, ApiError> {
        let path = format!("/conversations/{conversation_id}/messages");
        let body = serde_json::to_value(request).map_err(|e| ApiError::Transport(e.to_string()))?;
        self.send(reqwest::Method::POST, &path, Some(body)).await
    }

    async fn trigger_first_message(&self, conversation_id: &str) -> Result<Value, ApiError> {
        let path = format!("/conversations/{conversation_id}/trigger-first-message");
        self.send(reqwest::Method::POST, &path, None).await
    }
}
