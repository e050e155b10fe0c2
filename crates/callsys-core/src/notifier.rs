//! Outbound chat-bot messages.
//!
//! Uses enum dispatch instead of trait objects because async methods are
//! not dyn-compatible. The LINE transport pushes through the Messaging API;
//! without an access token messages are only logged.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::NotificationConfig;

/// Errors raised while rendering or delivering a message.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// A message template failed to compile or render.
    #[error("template error: {0}")]
    Template(String),

    /// The HTTP request could not be sent or its response read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The messaging API answered with a non-success status.
    #[error("push rejected with {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

// ---------------------------------------------------------------------------
// Unified notifier enum
// ---------------------------------------------------------------------------

/// Delivers a text message to one subscriber.
#[derive(Debug, Clone)]
pub enum Notifier {
    /// LINE Messaging API push.
    Line(LinePush),
    /// Log only; used when no access token is configured.
    Log,
    /// Keep messages in memory.
    Recording(Recorder),
}

impl Notifier {
    /// Pick the transport from configuration.
    pub fn from_config(config: &NotificationConfig) -> Self {
        match config.line_access_token.as_deref() {
            Some(token) if !token.is_empty() => {
                Self::Line(LinePush::new(&config.line_push_url, token))
            }
            _ => {
                info!("no LINE access token configured, notifications are logged only");
                Self::Log
            }
        }
    }

    /// Send `text` to subscriber `to`.
    pub async fn send(&self, to: &str, text: &str) -> Result<(), NotifyError> {
        match self {
            Self::Line(push) => push.push(to, text).await,
            Self::Log => {
                info!(subscriber = to, text, "notification (log only)");
                Ok(())
            }
            Self::Recording(recorder) => {
                recorder.record(to, text).await;
                Ok(())
            }
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Line(_) => "line",
            Self::Log => "log",
            Self::Recording(_) => "recording",
        }
    }
}

// ---------------------------------------------------------------------------
// LINE push transport
// ---------------------------------------------------------------------------

/// Pushes text messages through the LINE Messaging API.
#[derive(Clone)]
pub struct LinePush {
    client: reqwest::Client,
    push_url: String,
    access_token: String,
}

impl LinePush {
    /// Create a transport for the given endpoint and channel token.
    pub fn new(push_url: &str, access_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            push_url: push_url.to_owned(),
            access_token: access_token.to_owned(),
        }
    }

    async fn push(&self, to: &str, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "to": to,
            "messages": [{"type": "text", "text": text}]
        });

        let response = self
            .client
            .post(&self.push_url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(format!("LINE push failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(subscriber = to, "LINE push delivered");
        Ok(())
    }
}

impl std::fmt::Debug for LinePush {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinePush")
            .field("push_url", &self.push_url)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// In-memory recorder
// ---------------------------------------------------------------------------

/// A message captured by [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Recipient subscriber id.
    pub to: String,
    /// Rendered text.
    pub text: String,
}

/// Shared in-memory message sink.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl Recorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, to: &str, text: &str) {
        self.sent.lock().await.push(SentMessage {
            to: to.to_owned(),
            text: text.to_owned(),
        });
    }

    /// Messages sent so far, oldest first.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    /// Drain the captured messages.
    pub async fn take(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.sent.lock().await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_falls_back_to_log() {
        let notifier = Notifier::from_config(&NotificationConfig::default());
        assert_eq!(notifier.name(), "log");

        let config = NotificationConfig {
            line_access_token: Some("secret".to_owned()),
            ..NotificationConfig::default()
        };
        assert_eq!(Notifier::from_config(&config).name(), "line");
    }

    #[tokio::test]
    async fn recorder_captures_and_drains() {
        let recorder = Recorder::new();
        let notifier = Notifier::Recording(recorder.clone());
        notifier.send("U1", "hello").await.unwrap();
        notifier.send("U2", "bye").await.unwrap();

        let sent = recorder.take().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent.first().map(|m| m.to.as_str()), Some("U1"));
        assert!(recorder.sent().await.is_empty());
    }
}
