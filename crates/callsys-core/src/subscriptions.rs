//! Chat-bot subscription commands: subscribe, cancel, query, list passed.
//!
//! Each subscriber tracks at most one number on one line. Every reply
//! carries a rendered confirmation text for the adapter to send back.

use std::sync::Arc;

use callsys_db::{StateStore, SubscribeOutcome, Target};
use callsys_types::{QueueLine, Subscription};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::lines::LineRegistry;
use crate::templates::{MessageContext, MessageKind, MessageTemplates};
use crate::validate;

/// A subscriber's tracked number and how far away it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatus {
    /// The subscription.
    pub subscription: Subscription,
    /// Display name of the line.
    pub line_name: String,
    /// Line prefix.
    pub prefix: String,
    /// Number the line is serving.
    pub current: u64,
    /// Numbers still ahead of the subscriber.
    pub ahead: u64,
    /// Confirmation text for the subscriber.
    pub message: String,
}

/// Handles subscription commands from chat-bot adapters.
#[derive(Debug, Clone)]
pub struct SubscriptionService {
    state: StateStore,
    templates: Arc<MessageTemplates>,
    ttl_secs: u64,
}

impl SubscriptionService {
    /// Service storing subscriptions in `state` for `ttl_secs`.
    pub const fn new(state: StateStore, templates: Arc<MessageTemplates>, ttl_secs: u64) -> Self {
        Self {
            state,
            templates,
            ttl_secs,
        }
    }

    /// Track `number` on `line`, replacing the subscriber's previous target.
    ///
    /// Numbers already reached fail with [`QueueError::AlreadyPassed`] and
    /// leave any existing subscription in place.
    pub async fn subscribe(
        &self,
        subscriber_id: &str,
        line: &QueueLine,
        number: u64,
    ) -> Result<SubscriptionStatus, QueueError> {
        let subscriber_id = validate::subscriber_id(subscriber_id)?;
        let number = validate::positive_number(number)?;
        let target = Target {
            line_id: line.id,
            number,
        };
        match self
            .state
            .subscribe(subscriber_id, target, self.ttl_secs)
            .await?
        {
            SubscribeOutcome::Subscribed { previous } => {
                debug!(
                    subscriber = subscriber_id,
                    line_id = %line.id,
                    number,
                    moved_from = ?previous.map(|p| p.number),
                    "subscribed"
                );
                let current = self.state.queue_state(line.id).await?.current;
                self.status(subscriber_id, line, number, current, MessageKind::Subscribed)
            }
            SubscribeOutcome::AlreadyPassed { current } => Err(QueueError::AlreadyPassed {
                target: number,
                current,
            }),
        }
    }

    /// Drop the subscriber's target; `None` when there was nothing to drop.
    pub async fn cancel(
        &self,
        subscriber_id: &str,
        lines: &LineRegistry,
    ) -> Result<Option<SubscriptionStatus>, QueueError> {
        let subscriber_id = validate::subscriber_id(subscriber_id)?;
        let Some(target) = self.state.cancel_subscription(subscriber_id).await? else {
            return Ok(None);
        };
        let line = lines.get(target.line_id).await?;
        let current = self.state.queue_state(line.id).await?.current;
        self.status(subscriber_id, &line, target.number, current, MessageKind::Cancelled)
            .map(Some)
    }

    /// The subscriber's live target, if any.
    pub async fn query(
        &self,
        subscriber_id: &str,
        lines: &LineRegistry,
    ) -> Result<Option<SubscriptionStatus>, QueueError> {
        let subscriber_id = validate::subscriber_id(subscriber_id)?;
        let Some(target) = self.state.subscription_of(subscriber_id).await? else {
            return Ok(None);
        };
        let line = match lines.get(target.line_id).await {
            Ok(line) => line,
            Err(QueueError::NotFound(_)) => {
                warn!(subscriber = subscriber_id, line_id = %target.line_id, "subscription points at a deleted line");
                self.state.cancel_subscription(subscriber_id).await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let current = self.state.queue_state(line.id).await?.current;
        self.status(subscriber_id, &line, target.number, current, MessageKind::Subscribed)
            .map(Some)
    }

    /// Passed numbers of a line, ascending.
    pub async fn list_passed(&self, line: &QueueLine) -> Result<Vec<u64>, QueueError> {
        Ok(self.state.list_passed(line.id).await?)
    }

    fn status(
        &self,
        subscriber_id: &str,
        line: &QueueLine,
        number: u64,
        current: u64,
        kind: MessageKind,
    ) -> Result<SubscriptionStatus, QueueError> {
        let ahead = number.saturating_sub(current);
        let message = self
            .templates
            .render(
                kind,
                &MessageContext {
                    line_name: line.name.clone(),
                    prefix: line.prefix.clone(),
                    number,
                    current,
                    ahead,
                },
            )
            .map_err(|e| QueueError::Template(e.to_string()))?;
        Ok(SubscriptionStatus {
            subscription: Subscription {
                subscriber_id: subscriber_id.to_owned(),
                line_id: line.id,
                number,
            },
            line_name: line.name.clone(),
            prefix: line.prefix.clone(),
            current,
            ahead,
            message,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use callsys_db::RecordStore;

    use super::*;
    use crate::config::TemplateConfig;

    struct Fixture {
        state: StateStore,
        lines: LineRegistry,
        service: SubscriptionService,
    }

    fn fixture() -> Fixture {
        let state = StateStore::in_memory();
        let templates = Arc::new(MessageTemplates::new(&TemplateConfig::default()).unwrap());
        Fixture {
            service: SubscriptionService::new(state.clone(), templates, 3600),
            lines: LineRegistry::new(RecordStore::in_memory()),
            state,
        }
    }

    #[tokio::test]
    async fn subscribe_moves_between_targets() {
        let f = fixture();
        let line = f.lines.create("General", "A", "#000").await.unwrap();
        f.service.subscribe("U1", &line, 10).await.unwrap();
        let status = f.service.subscribe("U1", &line, 12).await.unwrap();
        assert_eq!(status.ahead, 12);
        assert!(status.message.contains("A12"));

        assert!(f.state.subscribers(line.id, 10).await.unwrap().is_empty());
        assert_eq!(f.state.subscribers(line.id, 12).await.unwrap(), vec!["U1"]);
    }

    #[tokio::test]
    async fn reached_number_is_rejected_without_state() {
        let f = fixture();
        let line = f.lines.create("General", "A", "#000").await.unwrap();
        f.state.set_current(line.id, 7).await.unwrap();

        let err = f.service.subscribe("U1", &line, 7).await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::AlreadyPassed {
                target: 7,
                current: 7
            }
        ));
        assert!(f.service.query("U1", &f.lines).await.unwrap().is_none());
        assert!(f.state.active_targets(line.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_and_cancel() {
        let f = fixture();
        let line = f.lines.create("General", "A", "#000").await.unwrap();
        f.state.set_current(line.id, 3).await.unwrap();
        f.service.subscribe("U1", &line, 8).await.unwrap();

        let status = f.service.query("U1", &f.lines).await.unwrap().unwrap();
        assert_eq!((status.current, status.ahead), (3, 5));

        let cancelled = f.service.cancel("U1", &f.lines).await.unwrap().unwrap();
        assert!(cancelled.message.contains("cancelled"));
        assert!(f.service.cancel("U1", &f.lines).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bad_input_rejected_before_store() {
        let f = fixture();
        let line = f.lines.create("General", "A", "#000").await.unwrap();
        assert!(matches!(
            f.service.subscribe("U 1", &line, 4).await,
            Err(QueueError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.service.subscribe("U1", &line, 0).await,
            Err(QueueError::InvalidArgument(_))
        ));
    }
}
