//! In-process twin of [`crate::DragonflyPool`].
//!
//! Used by tests and single-node development. Every operation takes one
//! lock over the whole state, which gives it the same atomicity as the Lua
//! scripts on `Dragonfly`. There is no native expiry: entries carry a
//! deadline, reads ignore expired entries and [`MemoryStore::sweep_expired`]
//! evicts them.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use callsys_types::{AdminLogEntry, LineId, QueueState, Session};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::DbError;
use crate::keys::Target;
use crate::store::{CounterUpdate, SubscribeOutcome};

/// A value with an optional deadline.
#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl_secs: u64) -> Self {
        Self {
            value,
            expires_at: deadline(ttl_secs),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

fn deadline(ttl_secs: u64) -> Instant {
    let now = Instant::now();
    now.checked_add(Duration::from_secs(ttl_secs.max(1)))
        .unwrap_or(now)
}

#[derive(Debug, Default)]
struct LineData {
    current: u64,
    issued: u64,
    passed: BTreeSet<u64>,
    subscribers: HashMap<u64, Expiring<HashSet<String>>>,
}

impl LineData {
    fn state(&self) -> QueueState {
        QueueState::new(self.current, self.issued)
    }

    fn set_current(&mut self, number: u64) -> QueueState {
        self.current = number;
        self.issued = self.issued.max(number);
        self.state()
    }

    fn remove_subscriber(&mut self, number: u64, subscriber_id: &str) {
        if let Some(set) = self.subscribers.get_mut(&number) {
            set.value.remove(subscriber_id);
            if set.value.is_empty() {
                self.subscribers.remove(&number);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    lines: HashMap<LineId, LineData>,
    reverse: HashMap<String, Expiring<Target>>,
    sessions: HashMap<String, Expiring<Session>>,
    settings: HashMap<String, String>,
    admin_log: VecDeque<AdminLogEntry>,
    rate: HashMap<String, Expiring<u64>>,
    claims: HashMap<String, Expiring<()>>,
}

impl Inner {
    fn line(&mut self, line_id: LineId) -> &mut LineData {
        self.lines.entry(line_id).or_default()
    }

    fn live_target(&self, subscriber_id: &str, now: Instant) -> Option<Target> {
        self.reverse
            .get(subscriber_id)
            .filter(|t| t.is_live(now))
            .map(|t| t.value)
    }

    fn take_subscribers(&mut self, line_id: LineId, number: u64, now: Instant) -> Vec<String> {
        let taken = self
            .line(line_id)
            .subscribers
            .remove(&number)
            .filter(|set| set.is_live(now))
            .map(|set| set.value)
            .unwrap_or_default();
        let target = Target { line_id, number };
        let mut members: Vec<String> = taken.into_iter().collect();
        members.sort_unstable();
        for member in &members {
            if self.reverse.get(member).is_some_and(|t| t.value == target) {
                self.reverse.remove(member);
            }
        }
        members
    }
}

/// Shared in-process state store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    /// Read the clamped state of a line.
    pub async fn queue_state(&self, line_id: LineId) -> QueueState {
        let inner = self.inner.lock().await;
        inner
            .lines
            .get(&line_id)
            .map(LineData::state)
            .unwrap_or_default()
    }

    /// Increment `current` if a ticket is waiting.
    pub async fn call_next(&self, line_id: LineId) -> CounterUpdate {
        let mut inner = self.inner.lock().await;
        let line = inner.line(line_id);
        if line.current >= line.issued {
            return CounterUpdate::unchanged(line.state());
        }
        line.current = line.current.saturating_add(1);
        CounterUpdate::applied(line.state())
    }

    /// Decrement `current`, floor zero.
    pub async fn call_prev(&self, line_id: LineId) -> CounterUpdate {
        let mut inner = self.inner.lock().await;
        let line = inner.line(line_id);
        if line.current == 0 {
            return CounterUpdate::unchanged(line.state());
        }
        line.current = line.current.saturating_sub(1);
        CounterUpdate::applied(line.state())
    }

    /// Set `current`, raising `issued` if needed.
    pub async fn set_current(&self, line_id: LineId, number: u64) -> QueueState {
        let mut inner = self.inner.lock().await;
        inner.line(line_id).set_current(number)
    }

    /// Move `current` forward to `number` unless it already reached it.
    pub async fn call_ahead(&self, line_id: LineId, number: u64) -> CounterUpdate {
        let mut inner = self.inner.lock().await;
        let line = inner.line(line_id);
        if line.current >= number {
            return CounterUpdate::unchanged(line.state());
        }
        CounterUpdate::applied(line.set_current(number))
    }

    /// Increment `issued`, starting from `current` if it lags behind.
    pub async fn issue_next(&self, line_id: LineId) -> QueueState {
        let mut inner = self.inner.lock().await;
        let line = inner.line(line_id);
        line.issued = line.issued.max(line.current).saturating_add(1);
        line.state()
    }

    /// Decrement `issued` unless it would drop below `current`.
    pub async fn issue_prev(&self, line_id: LineId) -> CounterUpdate {
        let mut inner = self.inner.lock().await;
        let line = inner.line(line_id);
        match line.issued.checked_sub(1) {
            Some(lower) if lower >= line.current => {
                line.issued = lower;
                CounterUpdate::applied(line.state())
            }
            _ => CounterUpdate::unchanged(line.state()),
        }
    }

    /// Set `issued` unless the value is below `current`.
    pub async fn set_issued(&self, line_id: LineId, number: u64) -> CounterUpdate {
        let mut inner = self.inner.lock().await;
        let line = inner.line(line_id);
        if number < line.current {
            return CounterUpdate::unchanged(line.state());
        }
        line.issued = number;
        CounterUpdate::applied(line.state())
    }

    /// Zero the counters and drop the passed list.
    pub async fn reset_counters(&self, line_id: LineId) {
        let mut inner = self.inner.lock().await;
        let line = inner.line(line_id);
        line.current = 0;
        line.issued = 0;
        line.passed.clear();
    }

    // -------------------------------------------------------------------------
    // Passed numbers
    // -------------------------------------------------------------------------

    /// Add a passed number, evicting the lowest beyond `cap`.
    pub async fn add_passed(&self, line_id: LineId, number: u64, cap: usize) -> Vec<u64> {
        let mut inner = self.inner.lock().await;
        let line = inner.line(line_id);
        line.passed.insert(number);
        while line.passed.len() > cap.max(1) {
            line.passed.pop_first();
        }
        line.passed.iter().copied().collect()
    }

    /// List passed numbers, ascending.
    pub async fn list_passed(&self, line_id: LineId) -> Vec<u64> {
        let inner = self.inner.lock().await;
        inner
            .lines
            .get(&line_id)
            .map(|l| l.passed.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove one passed number; `true` if it was present.
    pub async fn remove_passed(&self, line_id: LineId, number: u64) -> bool {
        let mut inner = self.inner.lock().await;
        inner.line(line_id).passed.remove(&number)
    }

    /// Drop the whole passed list.
    pub async fn clear_passed(&self, line_id: LineId) {
        let mut inner = self.inner.lock().await;
        inner.line(line_id).passed.clear();
    }

    /// Remove `number` from the passed list and make it current.
    pub async fn recall_passed(&self, line_id: LineId, number: u64) -> Option<QueueState> {
        let mut inner = self.inner.lock().await;
        let line = inner.line(line_id);
        line.passed
            .remove(&number)
            .then(|| line.set_current(number))
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Read a subscriber's live target.
    pub async fn subscription_of(&self, subscriber_id: &str) -> Option<Target> {
        let inner = self.inner.lock().await;
        inner.live_target(subscriber_id, Instant::now())
    }

    /// Point `subscriber_id` at `target`, evicting any previous target.
    pub async fn subscribe(
        &self,
        subscriber_id: &str,
        target: Target,
        ttl_secs: u64,
    ) -> SubscribeOutcome {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let current = inner.line(target.line_id).current;
        if target.number <= current {
            return SubscribeOutcome::AlreadyPassed { current };
        }
        let previous = inner.live_target(subscriber_id, now);
        if let Some(old) = previous {
            inner.line(old.line_id).remove_subscriber(old.number, subscriber_id);
        }
        let line = inner.line(target.line_id);
        let set = line
            .subscribers
            .entry(target.number)
            .or_insert_with(|| Expiring::new(HashSet::new(), ttl_secs));
        if !set.is_live(now) {
            set.value.clear();
        }
        set.value.insert(subscriber_id.to_owned());
        set.expires_at = deadline(ttl_secs);
        inner
            .reverse
            .insert(subscriber_id.to_owned(), Expiring::new(target, ttl_secs));
        SubscribeOutcome::Subscribed { previous }
    }

    /// Remove a subscriber's target; returns the dropped target.
    pub async fn cancel_subscription(&self, subscriber_id: &str) -> Option<Target> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let target = inner.live_target(subscriber_id, now)?;
        inner.reverse.remove(subscriber_id);
        inner
            .line(target.line_id)
            .remove_subscriber(target.number, subscriber_id);
        Some(target)
    }

    /// List subscribers of one number (non-consuming).
    pub async fn subscribers(&self, line_id: LineId, number: u64) -> Vec<String> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        let mut members: Vec<String> = inner
            .lines
            .get(&line_id)
            .and_then(|l| l.subscribers.get(&number))
            .filter(|set| set.is_live(now))
            .map(|set| set.value.iter().cloned().collect())
            .unwrap_or_default();
        members.sort_unstable();
        members
    }

    /// Consume every subscriber of one number.
    pub async fn take_subscribers(&self, line_id: LineId, number: u64) -> Vec<String> {
        let mut inner = self.inner.lock().await;
        inner.take_subscribers(line_id, number, Instant::now())
    }

    /// Numbers of a line with live subscribers, ascending.
    pub async fn active_targets(&self, line_id: LineId) -> Vec<u64> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        let mut numbers: Vec<u64> = inner
            .lines
            .get(&line_id)
            .map(|l| {
                l.subscribers
                    .iter()
                    .filter(|(_, set)| set.is_live(now))
                    .map(|(n, _)| *n)
                    .collect()
            })
            .unwrap_or_default();
        numbers.sort_unstable();
        numbers
    }

    /// Drop every subscription of a line; returns how many were removed.
    pub async fn clear_subscriptions(&self, line_id: LineId) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let numbers: Vec<u64> = inner.line(line_id).subscribers.keys().copied().collect();
        numbers
            .into_iter()
            .map(|n| inner.take_subscribers(line_id, n, now).len())
            .sum()
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Store a session with a time-to-live.
    pub async fn put_session(&self, session: &Session, ttl_secs: u64) {
        let mut inner = self.inner.lock().await;
        inner.sessions.insert(
            session.token.clone(),
            Expiring::new(session.clone(), ttl_secs),
        );
    }

    /// Read a live session and refresh its time-to-live.
    pub async fn touch_session(&self, token: &str, ttl_secs: u64) -> Option<Session> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let entry = inner.sessions.get_mut(token).filter(|s| s.is_live(now))?;
        entry.expires_at = deadline(ttl_secs);
        Some(entry.value.clone())
    }

    /// Delete a session.
    pub async fn delete_session(&self, token: &str) {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(token);
    }

    // -------------------------------------------------------------------------
    // Settings and operator log
    // -------------------------------------------------------------------------

    /// Read a raw setting.
    pub async fn get_setting(&self, name: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.settings.get(name).cloned()
    }

    /// Write a raw setting.
    pub async fn set_setting(&self, name: &str, value: &str) {
        let mut inner = self.inner.lock().await;
        inner.settings.insert(name.to_owned(), value.to_owned());
    }

    /// Prepend a log entry, keeping at most `cap`.
    pub async fn push_admin_log(&self, entry: &AdminLogEntry, cap: usize) {
        let mut inner = self.inner.lock().await;
        inner.admin_log.push_front(entry.clone());
        inner.admin_log.truncate(cap.max(1));
    }

    /// Read the log, newest first.
    pub async fn admin_log(&self) -> Vec<AdminLogEntry> {
        let inner = self.inner.lock().await;
        inner.admin_log.iter().cloned().collect()
    }

    /// Delete the log.
    pub async fn clear_admin_log(&self) {
        let mut inner = self.inner.lock().await;
        inner.admin_log.clear();
    }

    // -------------------------------------------------------------------------
    // Rate limiting and locks
    // -------------------------------------------------------------------------

    /// Count a hit for `caller` in the current fixed window.
    pub async fn rate_hit(&self, caller: &str, window_secs: u64) -> u64 {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let entry = inner
            .rate
            .entry(caller.to_owned())
            .or_insert_with(|| Expiring::new(0, window_secs));
        if !entry.is_live(now) {
            *entry = Expiring::new(0, window_secs);
        }
        entry.value = entry.value.saturating_add(1);
        entry.value
    }

    /// Take a one-shot lock; `true` only for the first caller within the TTL.
    pub async fn claim_once(&self, name: &str, ttl_secs: u64) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        if inner.claims.get(name).is_some_and(|c| c.is_live(now)) {
            return false;
        }
        inner
            .claims
            .insert(name.to_owned(), Expiring::new((), ttl_secs));
        true
    }

    /// Evict expired sessions, subscriptions, rate windows and locks.
    ///
    /// Returns the number of entries removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let mut removed = 0_usize;

        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.is_live(now));
        removed = removed.saturating_add(before.saturating_sub(inner.sessions.len()));

        let before = inner.reverse.len();
        inner.reverse.retain(|_, t| t.is_live(now));
        removed = removed.saturating_add(before.saturating_sub(inner.reverse.len()));

        for line in inner.lines.values_mut() {
            let before = line.subscribers.len();
            line.subscribers.retain(|_, set| set.is_live(now));
            removed = removed.saturating_add(before.saturating_sub(line.subscribers.len()));
        }

        inner.rate.retain(|_, r| r.is_live(now));
        inner.claims.retain(|_, c| c.is_live(now));
        removed
    }

    /// Drop all state.
    pub async fn flush_all(&self) {
        let mut inner = self.inner.lock().await;
        *inner = Inner::default();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_next_stops_at_issued() {
        let store = MemoryStore::new();
        let line = LineId::new();
        store.issue_next(line).await;
        assert!(store.call_next(line).await.applied);
        let second = store.call_next(line).await;
        assert!(!second.applied);
        assert_eq!(second.state, QueueState::new(1, 1));
    }

    #[tokio::test]
    async fn call_ahead_never_moves_current_back() {
        let store = MemoryStore::new();
        let line = LineId::new();
        store.set_current(line, 9).await;
        let stale = store.call_ahead(line, 8).await;
        assert!(!stale.applied);
        assert_eq!(stale.state, QueueState::new(9, 9));

        let jump = store.call_ahead(line, 12).await;
        assert!(jump.applied);
        assert_eq!(jump.state, QueueState::new(12, 12));
    }

    #[tokio::test]
    async fn passed_list_evicts_lowest_over_cap() {
        let store = MemoryStore::new();
        let line = LineId::new();
        for n in [4, 2, 9, 7] {
            store.add_passed(line, n, 3).await;
        }
        assert_eq!(store.list_passed(line).await, vec![4, 7, 9]);
    }

    #[tokio::test]
    async fn take_consumes_subscribers_once() {
        let store = MemoryStore::new();
        let line = LineId::new();
        let target = Target { line_id: line, number: 3 };
        store.subscribe("u1", target, 60).await;
        assert_eq!(store.take_subscribers(line, 3).await, vec!["u1".to_owned()]);
        assert!(store.take_subscribers(line, 3).await.is_empty());
        assert_eq!(store.subscription_of("u1").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_expire_and_sweep_evicts_them() {
        let store = MemoryStore::new();
        let session = Session {
            token: "t".to_owned(),
            username: "alice".to_owned(),
            role: callsys_types::Role::Operator,
            nickname: "Alice".to_owned(),
        };
        store.put_session(&session, 10).await;
        assert!(store.touch_session("t", 10).await.is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.touch_session("t", 10).await.is_none());
        assert_eq!(store.sweep_expired().await, 1);
    }

    #[tokio::test]
    async fn claim_once_is_exclusive() {
        let store = MemoryStore::new();
        assert!(store.claim_once("reset:2026-01-01", 60).await);
        assert!(!store.claim_once("reset:2026-01-01", 60).await);
    }
}
