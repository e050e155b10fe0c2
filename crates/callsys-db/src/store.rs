//! Backend-agnostic handle to the shared queue state.
//!
//! Uses enum dispatch instead of trait objects because async methods are
//! not dyn-compatible. Production runs on [`DragonflyPool`]; tests and
//! single-node development run on [`MemoryStore`].

use callsys_types::{AdminLogEntry, FeaturedContent, LineId, QueueState, Session};

use crate::dragonfly::DragonflyPool;
use crate::error::DbError;
use crate::keys::Target;
use crate::memory::MemoryStore;

/// Setting names stored under `settings:{name}`.
pub mod setting {
    /// `"true"` while the public display is open.
    pub const IS_PUBLIC: &str = "is_public";
    /// `"true"` while displays should play sounds.
    pub const SOUND_ENABLED: &str = "sound_enabled";
    /// `ticketing` or `input`.
    pub const SYSTEM_MODE: &str = "system_mode";
    /// JSON array of featured links.
    pub const FEATURED: &str = "featured";
}

/// Result of a conditional counter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    /// Whether the condition held and the counter moved.
    pub applied: bool,
    /// State after the attempt (unchanged when not applied).
    pub state: QueueState,
}

impl CounterUpdate {
    /// The counter moved.
    pub const fn applied(state: QueueState) -> Self {
        Self {
            applied: true,
            state,
        }
    }

    /// The condition failed; `state` is what was observed.
    pub const fn unchanged(state: QueueState) -> Self {
        Self {
            applied: false,
            state,
        }
    }
}

/// Result of pointing a subscriber at a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The subscription is active.
    Subscribed {
        /// Target the subscriber was moved away from, if any.
        previous: Option<Target>,
    },
    /// The number has already been reached; nothing was stored.
    AlreadyPassed {
        /// Current number of the line at the time of the attempt.
        current: u64,
    },
}

/// Shared queue state, backed by `Dragonfly` or held in process.
#[derive(Clone)]
pub enum StateStore {
    /// Shared `Dragonfly` instance (multi-instance deployments).
    Dragonfly(DragonflyPool),
    /// In-process store.
    Memory(MemoryStore),
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StateStore").field(&self.backend()).finish()
    }
}

impl StateStore {
    /// Fresh in-process store.
    pub fn in_memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    /// Backend name for logs.
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Dragonfly(_) => "dragonfly",
            Self::Memory(_) => "memory",
        }
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    /// Read the clamped state of a line.
    pub async fn queue_state(&self, line_id: LineId) -> Result<QueueState, DbError> {
        match self {
            Self::Dragonfly(d) => d.queue_state(line_id).await,
            Self::Memory(m) => Ok(m.queue_state(line_id).await),
        }
    }

    /// Increment `current` only while `current < issued`.
    pub async fn call_next(&self, line_id: LineId) -> Result<CounterUpdate, DbError> {
        match self {
            Self::Dragonfly(d) => d.call_next(line_id).await,
            Self::Memory(m) => Ok(m.call_next(line_id).await),
        }
    }

    /// Decrement `current`, floor zero.
    pub async fn call_prev(&self, line_id: LineId) -> Result<CounterUpdate, DbError> {
        match self {
            Self::Dragonfly(d) => d.call_prev(line_id).await,
            Self::Memory(m) => Ok(m.call_prev(line_id).await),
        }
    }

    /// Set `current`, raising `issued` when it would fall behind.
    pub async fn set_current(&self, line_id: LineId, number: u64) -> Result<QueueState, DbError> {
        match self {
            Self::Dragonfly(d) => d.set_current(line_id, number).await,
            Self::Memory(m) => Ok(m.set_current(line_id, number).await),
        }
    }

    /// Move `current` forward to `number` only while `current < number`,
    /// raising `issued` when it would fall behind.
    pub async fn call_ahead(&self, line_id: LineId, number: u64) -> Result<CounterUpdate, DbError> {
        match self {
            Self::Dragonfly(d) => d.call_ahead(line_id, number).await,
            Self::Memory(m) => Ok(m.call_ahead(line_id, number).await),
        }
    }

    /// Increment `issued`.
    pub async fn issue_next(&self, line_id: LineId) -> Result<QueueState, DbError> {
        match self {
            Self::Dragonfly(d) => d.issue_next(line_id).await,
            Self::Memory(m) => Ok(m.issue_next(line_id).await),
        }
    }

    /// Decrement `issued` only while it stays `>= current`.
    pub async fn issue_prev(&self, line_id: LineId) -> Result<CounterUpdate, DbError> {
        match self {
            Self::Dragonfly(d) => d.issue_prev(line_id).await,
            Self::Memory(m) => Ok(m.issue_prev(line_id).await),
        }
    }

    /// Set `issued` only when the value is `>= current`.
    pub async fn set_issued(&self, line_id: LineId, number: u64) -> Result<CounterUpdate, DbError> {
        match self {
            Self::Dragonfly(d) => d.set_issued(line_id, number).await,
            Self::Memory(m) => Ok(m.set_issued(line_id, number).await),
        }
    }

    /// Zero the counters and drop the passed list.
    pub async fn reset_counters(&self, line_id: LineId) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(d) => d.reset_counters(line_id).await,
            Self::Memory(m) => {
                m.reset_counters(line_id).await;
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Passed numbers
    // -------------------------------------------------------------------------

    /// Add a passed number, keeping at most `cap`; returns the list.
    pub async fn add_passed(
        &self,
        line_id: LineId,
        number: u64,
        cap: usize,
    ) -> Result<Vec<u64>, DbError> {
        match self {
            Self::Dragonfly(d) => d.add_passed(line_id, number, cap).await,
            Self::Memory(m) => Ok(m.add_passed(line_id, number, cap).await),
        }
    }

    /// Passed numbers, ascending.
    pub async fn list_passed(&self, line_id: LineId) -> Result<Vec<u64>, DbError> {
        match self {
            Self::Dragonfly(d) => d.list_passed(line_id).await,
            Self::Memory(m) => Ok(m.list_passed(line_id).await),
        }
    }

    /// Remove one passed number; `true` if it was present.
    pub async fn remove_passed(&self, line_id: LineId, number: u64) -> Result<bool, DbError> {
        match self {
            Self::Dragonfly(d) => d.remove_passed(line_id, number).await,
            Self::Memory(m) => Ok(m.remove_passed(line_id, number).await),
        }
    }

    /// Drop the whole passed list.
    pub async fn clear_passed(&self, line_id: LineId) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(d) => d.clear_passed(line_id).await,
            Self::Memory(m) => {
                m.clear_passed(line_id).await;
                Ok(())
            }
        }
    }

    /// Remove `number` from the passed list and make it current.
    pub async fn recall_passed(
        &self,
        line_id: LineId,
        number: u64,
    ) -> Result<Option<QueueState>, DbError> {
        match self {
            Self::Dragonfly(d) => d.recall_passed(line_id, number).await,
            Self::Memory(m) => Ok(m.recall_passed(line_id, number).await),
        }
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// A subscriber's active target.
    pub async fn subscription_of(&self, subscriber_id: &str) -> Result<Option<Target>, DbError> {
        match self {
            Self::Dragonfly(d) => d.subscription_of(subscriber_id).await,
            Self::Memory(m) => Ok(m.subscription_of(subscriber_id).await),
        }
    }

    /// Point a subscriber at `target`, evicting the previous target.
    pub async fn subscribe(
        &self,
        subscriber_id: &str,
        target: Target,
        ttl_secs: u64,
    ) -> Result<SubscribeOutcome, DbError> {
        match self {
            Self::Dragonfly(d) => d.subscribe(subscriber_id, target, ttl_secs).await,
            Self::Memory(m) => Ok(m.subscribe(subscriber_id, target, ttl_secs).await),
        }
    }

    /// Remove a subscriber's target; returns the dropped target.
    pub async fn cancel_subscription(&self, subscriber_id: &str) -> Result<Option<Target>, DbError> {
        match self {
            Self::Dragonfly(d) => d.cancel_subscription(subscriber_id).await,
            Self::Memory(m) => Ok(m.cancel_subscription(subscriber_id).await),
        }
    }

    /// Subscribers of one number (non-consuming).
    pub async fn subscribers(&self, line_id: LineId, number: u64) -> Result<Vec<String>, DbError> {
        match self {
            Self::Dragonfly(d) => d.subscribers(line_id, number).await,
            Self::Memory(m) => Ok(m.subscribers(line_id, number).await),
        }
    }

    /// Consume every subscriber of one number, exactly once.
    pub async fn take_subscribers(
        &self,
        line_id: LineId,
        number: u64,
    ) -> Result<Vec<String>, DbError> {
        match self {
            Self::Dragonfly(d) => d.take_subscribers(line_id, number).await,
            Self::Memory(m) => Ok(m.take_subscribers(line_id, number).await),
        }
    }

    /// Numbers of a line with at least one subscriber, ascending.
    pub async fn active_targets(&self, line_id: LineId) -> Result<Vec<u64>, DbError> {
        match self {
            Self::Dragonfly(d) => d.active_targets(line_id).await,
            Self::Memory(m) => Ok(m.active_targets(line_id).await),
        }
    }

    /// Drop every subscription of a line.
    pub async fn clear_subscriptions(&self, line_id: LineId) -> Result<usize, DbError> {
        match self {
            Self::Dragonfly(d) => d.clear_subscriptions(line_id).await,
            Self::Memory(m) => Ok(m.clear_subscriptions(line_id).await),
        }
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Store a session with a time-to-live.
    pub async fn put_session(&self, session: &Session, ttl_secs: u64) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(d) => d.put_session(session, ttl_secs).await,
            Self::Memory(m) => {
                m.put_session(session, ttl_secs).await;
                Ok(())
            }
        }
    }

    /// Read a session and refresh its time-to-live.
    pub async fn touch_session(
        &self,
        token: &str,
        ttl_secs: u64,
    ) -> Result<Option<Session>, DbError> {
        match self {
            Self::Dragonfly(d) => d.touch_session(token, ttl_secs).await,
            Self::Memory(m) => Ok(m.touch_session(token, ttl_secs).await),
        }
    }

    /// Delete a session.
    pub async fn delete_session(&self, token: &str) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(d) => d.delete_session(token).await,
            Self::Memory(m) => {
                m.delete_session(token).await;
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    /// Read a raw setting.
    pub async fn get_setting(&self, name: &str) -> Result<Option<String>, DbError> {
        match self {
            Self::Dragonfly(d) => d.get_setting(name).await,
            Self::Memory(m) => Ok(m.get_setting(name).await),
        }
    }

    /// Write a raw setting.
    pub async fn set_setting(&self, name: &str, value: &str) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(d) => d.set_setting(name, value).await,
            Self::Memory(m) => {
                m.set_setting(name, value).await;
                Ok(())
            }
        }
    }

    /// Read a boolean setting, `default` when unset.
    pub async fn get_flag(&self, name: &str, default: bool) -> Result<bool, DbError> {
        Ok(self
            .get_setting(name)
            .await?
            .map_or(default, |v| v == "true"))
    }

    /// Write a boolean setting.
    pub async fn set_flag(&self, name: &str, value: bool) -> Result<(), DbError> {
        self.set_setting(name, if value { "true" } else { "false" })
            .await
    }

    /// Featured links, empty when unset.
    pub async fn featured(&self) -> Result<Vec<FeaturedContent>, DbError> {
        match self.get_setting(setting::FEATURED).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the featured links.
    pub async fn set_featured(&self, items: &[FeaturedContent]) -> Result<(), DbError> {
        let json = serde_json::to_string(items)?;
        self.set_setting(setting::FEATURED, &json).await
    }

    // -------------------------------------------------------------------------
    // Operator log
    // -------------------------------------------------------------------------

    /// Prepend an operator log entry, keeping at most `cap`.
    pub async fn push_admin_log(&self, entry: &AdminLogEntry, cap: usize) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(d) => d.push_admin_log(entry, cap).await,
            Self::Memory(m) => {
                m.push_admin_log(entry, cap).await;
                Ok(())
            }
        }
    }

    /// Operator log, newest first.
    pub async fn admin_log(&self) -> Result<Vec<AdminLogEntry>, DbError> {
        match self {
            Self::Dragonfly(d) => d.admin_log().await,
            Self::Memory(m) => Ok(m.admin_log().await),
        }
    }

    /// Delete the operator log.
    pub async fn clear_admin_log(&self) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(d) => d.clear_admin_log().await,
            Self::Memory(m) => {
                m.clear_admin_log().await;
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Rate limiting, locks, housekeeping
    // -------------------------------------------------------------------------

    /// Count a hit for `caller` in the current window.
    pub async fn rate_hit(&self, caller: &str, window_secs: u64) -> Result<u64, DbError> {
        match self {
            Self::Dragonfly(d) => d.rate_hit(caller, window_secs).await,
            Self::Memory(m) => Ok(m.rate_hit(caller, window_secs).await),
        }
    }

    /// Take a one-shot lock; `true` only for the first caller.
    pub async fn claim_once(&self, name: &str, ttl_secs: u64) -> Result<bool, DbError> {
        match self {
            Self::Dragonfly(d) => d.claim_once(name, ttl_secs).await,
            Self::Memory(m) => Ok(m.claim_once(name, ttl_secs).await),
        }
    }

    /// Periodic housekeeping for one line.
    ///
    /// On `Dragonfly`, expiry is native and only dangling active-target
    /// entries are pruned. In process, expired entries of every kind are
    /// evicted. Returns the number of entries removed.
    pub async fn sweep(&self, line_ids: &[LineId]) -> Result<usize, DbError> {
        match self {
            Self::Dragonfly(d) => {
                let mut removed = 0_usize;
                for line_id in line_ids {
                    removed = removed.saturating_add(d.prune_active_targets(*line_id).await?);
                }
                Ok(removed)
            }
            Self::Memory(m) => Ok(m.sweep_expired().await),
        }
    }

    /// Drop all state. Test-only in practice.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(d) => d.flush_all().await,
            Self::Memory(m) => {
                m.flush_all().await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flags_default_until_written() {
        let store = StateStore::in_memory();
        assert!(store.get_flag(setting::IS_PUBLIC, true).await.unwrap());
        store.set_flag(setting::IS_PUBLIC, false).await.unwrap();
        assert!(!store.get_flag(setting::IS_PUBLIC, true).await.unwrap());
    }

    #[tokio::test]
    async fn featured_links_round_trip_as_json() {
        let store = StateStore::in_memory();
        assert!(store.featured().await.unwrap().is_empty());
        let items = vec![FeaturedContent {
            link_text: "Menu".to_owned(),
            link_url: "https://example.com/menu".to_owned(),
        }];
        store.set_featured(&items).await.unwrap();
        assert_eq!(store.featured().await.unwrap(), items);
    }

    #[tokio::test]
    async fn resubscribing_moves_the_subscriber() {
        let store = StateStore::in_memory();
        let line = LineId::new();
        store.set_issued(line, 20).await.unwrap();

        let a = Target { line_id: line, number: 10 };
        let b = Target { line_id: line, number: 12 };
        store.subscribe("u1", a, 60).await.unwrap();
        let outcome = store.subscribe("u1", b, 60).await.unwrap();

        assert_eq!(outcome, SubscribeOutcome::Subscribed { previous: Some(a) });
        assert!(store.subscribers(line, 10).await.unwrap().is_empty());
        assert_eq!(store.subscribers(line, 12).await.unwrap(), vec!["u1".to_owned()]);
        assert_eq!(store.active_targets(line).await.unwrap(), vec![12]);
    }

    #[tokio::test]
    async fn subscribing_at_or_below_current_stores_nothing() {
        let store = StateStore::in_memory();
        let line = LineId::new();
        store.set_current(line, 7).await.unwrap();

        let outcome = store
            .subscribe("u1", Target { line_id: line, number: 7 }, 60)
            .await
            .unwrap();
        assert_eq!(outcome, SubscribeOutcome::AlreadyPassed { current: 7 });
        assert_eq!(store.subscription_of("u1").await.unwrap(), None);
    }
}
