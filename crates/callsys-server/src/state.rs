//! Shared application state for the API server.
//!
//! [`AppState`] wraps the assembled [`QueueSystem`] and resolves request
//! credentials: operator bearer tokens and the chat-bot header token.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use callsys_core::{QueueError, QueueSystem};
use callsys_types::Session;

use crate::error::ApiError;

/// Header chat-bot adapters put their shared token in.
pub const BOT_TOKEN_HEADER: &str = "x-bot-token";

/// Caller key used when a request carries no client address header.
const UNKNOWN_CALLER: &str = "unknown";

/// Shared state injected into every handler via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    system: Arc<QueueSystem>,
}

impl AppState {
    /// State serving `system`.
    pub const fn new(system: Arc<QueueSystem>) -> Self {
        Self { system }
    }

    /// The queue service.
    pub fn system(&self) -> &QueueSystem {
        &self.system
    }

    /// Resolve the `Authorization: Bearer <token>` header to a session.
    pub async fn session(&self, headers: &HeaderMap) -> Result<Session, ApiError> {
        let token = bearer_token(headers).ok_or(QueueError::Unauthorized)?;
        Ok(self.system.auth().authenticate(token).await?)
    }

    /// Check the chat-bot token header.
    pub fn verify_bot(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let token = headers
            .get(BOT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Ok(self.system.auth().verify_bot(token)?)
    }
}

/// Token of an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Rate-limit key of a public caller: the first `X-Forwarded-For` entry,
/// then `X-Real-IP`.
pub fn caller_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CALLER)
        .to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }

    #[test]
    fn caller_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_key(&headers), "unknown");
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(caller_key(&headers), "10.0.0.9");
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(caller_key(&headers), "203.0.113.5");
    }
}
