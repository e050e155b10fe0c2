//! Fan-out of [`BroadcastEvent`]s to connected clients.
//!
//! Locally, events go through a tokio broadcast channel that every
//! `WebSocket` connection subscribes to. With NATS configured, event
//! batches are published on [`EVENTS_SUBJECT`] instead and a relay task on
//! each instance forwards every batch, its own included, into the local
//! channel. Clients on any instance see changes made on any instance.

use callsys_types::BroadcastEvent;
use futures::StreamExt as _;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the local broadcast channel.
///
/// A subscriber that falls further behind receives
/// [`broadcast::error::RecvError::Lagged`] and skips to the newest event.
const BROADCAST_CAPACITY: usize = 256;

/// NATS subject carrying JSON-encoded event batches.
pub const EVENTS_SUBJECT: &str = "callsys.events";

/// Errors from the NATS side of the broadcaster.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    /// Could not connect to the NATS server.
    #[error("failed to connect to NATS at {url}: {reason}")]
    Connect {
        /// Server URL.
        url: String,
        /// Underlying error.
        reason: String,
    },

    /// Could not subscribe to the events subject.
    #[error("failed to subscribe to event subject: {0}")]
    Subscribe(String),
}

/// Publishes events to local subscribers, optionally through NATS.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<BroadcastEvent>,
    nats: Option<async_nats::Client>,
}

impl Broadcaster {
    /// In-process broadcaster without cross-instance fan-out.
    pub fn local() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx, nats: None }
    }

    /// Broadcaster that fans out through the NATS server at `url`.
    ///
    /// Call [`Broadcaster::spawn_relay`] afterwards so published batches
    /// reach local subscribers.
    pub async fn connect_nats(url: &str) -> Result<Self, BroadcastError> {
        info!(url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BroadcastError::Connect {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        info!("NATS connection established");
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Ok(Self {
            tx,
            nats: Some(client),
        })
    }

    /// Whether events travel through NATS.
    pub const fn is_distributed(&self) -> bool {
        self.nats.is_some()
    }

    /// Subscribe to the local event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Publish a batch of events.
    ///
    /// Returns the number of local receivers reached directly; batches
    /// that go through NATS are delivered by the relay and count as 0.
    /// A failed NATS publish falls back to local delivery.
    pub async fn publish(&self, events: &[BroadcastEvent]) -> usize {
        if events.is_empty() {
            return 0;
        }
        if let Some(client) = &self.nats {
            match serde_json::to_vec(events) {
                Ok(payload) => match client.publish(EVENTS_SUBJECT, payload.into()).await {
                    Ok(()) => return 0,
                    Err(e) => warn!(error = %e, "NATS publish failed, delivering locally"),
                },
                Err(e) => warn!(error = %e, "failed to serialize event batch"),
            }
        }
        self.send_local(events)
    }

    fn send_local(&self, events: &[BroadcastEvent]) -> usize {
        // send returns Err only when no client is connected.
        events
            .iter()
            .map(|event| self.tx.send(event.clone()).unwrap_or(0))
            .max()
            .unwrap_or(0)
    }

    /// Forward batches from NATS into the local channel.
    ///
    /// Returns `Ok(None)` when NATS is not configured.
    pub async fn spawn_relay(&self) -> Result<Option<JoinHandle<()>>, BroadcastError> {
        let Some(client) = &self.nats else {
            return Ok(None);
        };
        let mut subscriber = client
            .subscribe(EVENTS_SUBJECT)
            .await
            .map_err(|e| BroadcastError::Subscribe(e.to_string()))?;
        let tx = self.tx.clone();
        info!(subject = EVENTS_SUBJECT, "event relay subscribed");

        Ok(Some(tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                match serde_json::from_slice::<Vec<BroadcastEvent>>(&message.payload) {
                    Ok(events) => {
                        debug!(count = events.len(), "relaying event batch");
                        for event in events {
                            let _ = tx.send(event);
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping malformed event batch"),
                }
            }
            warn!("event relay subscription closed");
        })))
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::local()
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("distributed", &self.is_distributed())
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use callsys_types::{LineId, QueueState};

    use super::*;

    #[tokio::test]
    async fn local_batches_reach_every_subscriber_in_order() {
        let broadcaster = Broadcaster::local();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        let line_id = LineId::new();
        let batch = [
            BroadcastEvent::queue(line_id, QueueState::new(1, 3)),
            BroadcastEvent::Announcement {
                message: "hello".to_owned(),
            },
        ];

        assert_eq!(broadcaster.publish(&batch).await, 2);
        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap(), batch[0]);
            assert_eq!(rx.recv().await.unwrap(), batch[1]);
        }
    }

    #[tokio::test]
    async fn publishing_without_clients_is_not_an_error() {
        let broadcaster = Broadcaster::local();
        let sent = broadcaster
            .publish(&[BroadcastEvent::SoundSetting { enabled: true }])
            .await;
        assert_eq!(sent, 0);
        assert!(broadcaster.spawn_relay().await.unwrap().is_none());
    }
}
