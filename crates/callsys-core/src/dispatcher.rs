//! Proximity and arrival notifications.
//!
//! Runs after every change of a line's current number, decrements
//! included. Subscribers of `current + lookahead` get an approach message
//! and keep their subscription, so they may hear it again if the number
//! moves back and forth. Subscribers of exactly `current` are consumed
//! from the store before the arrival message goes out, so each of them is
//! notified at most once.
//!
//! Delivery failures are logged and swallowed.

use std::sync::Arc;

use callsys_db::StateStore;
use callsys_types::QueueLine;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::notifier::Notifier;
use crate::templates::{MessageContext, MessageKind, MessageTemplates};

/// What one dispatch round delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Approach messages delivered.
    pub approached: usize,
    /// Arrival messages delivered.
    pub arrived: usize,
}

/// Matches the current number against subscriptions and sends messages.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    state: StateStore,
    notifier: Notifier,
    templates: Arc<MessageTemplates>,
    lookahead: u64,
}

impl Dispatcher {
    /// Create a dispatcher warning subscribers `lookahead` numbers early.
    pub const fn new(
        state: StateStore,
        notifier: Notifier,
        templates: Arc<MessageTemplates>,
        lookahead: u64,
    ) -> Self {
        Self {
            state,
            notifier,
            templates,
            lookahead,
        }
    }

    /// Notify the subscribers affected by `line` now serving `current`.
    pub async fn on_current_changed(&self, line: &QueueLine, current: u64) -> DispatchReport {
        let mut report = DispatchReport::default();

        if let Some(target) = current.checked_add(self.lookahead).filter(|_| self.lookahead > 0) {
            match self.state.subscribers(line.id, target).await {
                Ok(subscribers) => {
                    report.approached = self
                        .deliver(line, MessageKind::Approach, target, current, &subscribers)
                        .await;
                }
                Err(e) => {
                    warn!(line_id = %line.id, number = target, error = %e, "approach lookup failed");
                }
            }
        }

        if current > 0 {
            match self.state.take_subscribers(line.id, current).await {
                Ok(subscribers) => {
                    report.arrived = self
                        .deliver(line, MessageKind::Arrival, current, current, &subscribers)
                        .await;
                }
                Err(e) => {
                    warn!(line_id = %line.id, number = current, error = %e, "arrival lookup failed");
                }
            }
        }

        report
    }

    /// Render one message and send it to every subscriber concurrently.
    ///
    /// Returns how many sends succeeded.
    async fn deliver(
        &self,
        line: &QueueLine,
        kind: MessageKind,
        number: u64,
        current: u64,
        subscribers: &[String],
    ) -> usize {
        if subscribers.is_empty() {
            return 0;
        }
        let ctx = MessageContext {
            line_name: line.name.clone(),
            prefix: line.prefix.clone(),
            number,
            current,
            ahead: number.saturating_sub(current),
        };
        let text = match self.templates.render(kind, &ctx) {
            Ok(text) => text,
            Err(e) => {
                warn!(line_id = %line.id, number, error = %e, "notification render failed");
                return 0;
            }
        };

        let sends = subscribers.iter().map(|to| {
            let text = &text;
            async move {
                match self.notifier.send(to, text).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            line_id = %line.id,
                            number,
                            subscriber = %to,
                            error = %e,
                            "notification delivery failed"
                        );
                        false
                    }
                }
            }
        });
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();
        debug!(line_id = %line.id, number, ?kind, delivered, "notifications sent");
        delivered
    }
}
