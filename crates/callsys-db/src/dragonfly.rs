//! `Dragonfly` (Redis-compatible) shared queue state.
//!
//! `Dragonfly` holds everything that several server instances mutate
//! concurrently: the per-line counters, passed lists, subscriptions,
//! sessions, flags and the operator log. Conditional updates run as Lua
//! scripts (see [`crate::scripts`]) so each one is a single atomic step on
//! the server. Key patterns are listed in [`crate::keys`].

use callsys_types::{AdminLogEntry, LineId, QueueState, Session};
use fred::prelude::*;
use fred::types::Expiration;

use crate::error::DbError;
use crate::keys::{self, Target};
use crate::scripts;
use crate::store::{CounterUpdate, SubscribeOutcome};

/// How often an optimistic subscription script is retried after losing a
/// race on the reverse index.
const MAX_SCRIPT_RETRIES: usize = 5;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`] and provides typed operations
/// for the key patterns in [`crate::keys`].
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    // =========================================================================
    // Script helpers
    // =========================================================================

    async fn eval_ints(
        &self,
        script: &str,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> Result<Vec<i64>, DbError> {
        let values: Vec<i64> = self.client.eval(script, keys, args).await?;
        Ok(values)
    }

    async fn eval_int(
        &self,
        script: &str,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> Result<i64, DbError> {
        let value: i64 = self.client.eval(script, keys, args).await?;
        Ok(value)
    }

    async fn eval_strings(
        &self,
        script: &str,
        keys: Vec<String>,
        args: Vec<String>,
    ) -> Result<Vec<String>, DbError> {
        let values: Vec<String> = self.client.eval(script, keys, args).await?;
        Ok(values)
    }

    async fn counter_script(
        &self,
        script: &str,
        line_id: LineId,
        args: Vec<String>,
    ) -> Result<CounterUpdate, DbError> {
        let keys = vec![keys::current(line_id), keys::issued(line_id)];
        let values = self.eval_ints(script, keys, args).await?;
        CounterUpdate::from_script(&keys::current(line_id), &values)
    }

    // =========================================================================
    // Generic helpers
    // =========================================================================

    /// Delete a key from `Dragonfly`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    // =========================================================================
    // Queue counters -- line:{id}:current, line:{id}:issued
    // =========================================================================

    /// Read the clamped state of a line.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or a counter is not an integer.
    pub async fn queue_state(&self, line_id: LineId) -> Result<QueueState, DbError> {
        let current_key = keys::current(line_id);
        let issued_key = keys::issued(line_id);
        let current: Option<String> = self.client.get(&current_key).await?;
        let issued: Option<String> = self.client.get(&issued_key).await?;
        Ok(QueueState::new(
            parse_counter(&current_key, current.as_deref())?,
            parse_counter(&issued_key, issued.as_deref())?,
        ))
    }

    /// Increment `current` if a ticket is waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn call_next(&self, line_id: LineId) -> Result<CounterUpdate, DbError> {
        self.counter_script(scripts::CALL_NEXT, line_id, Vec::new())
            .await
    }

    /// Decrement `current`, floor zero.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn call_prev(&self, line_id: LineId) -> Result<CounterUpdate, DbError> {
        self.counter_script(scripts::CALL_PREV, line_id, Vec::new())
            .await
    }

    /// Set `current`, raising `issued` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn set_current(&self, line_id: LineId, number: u64) -> Result<QueueState, DbError> {
        let keys = vec![keys::current(line_id), keys::issued(line_id)];
        let values = self
            .eval_ints(scripts::SET_CURRENT, keys, vec![number.to_string()])
            .await?;
        state_from_pair(&keys::current(line_id), &values)
    }

    /// Move `current` forward to `number` unless it already reached it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn call_ahead(&self, line_id: LineId, number: u64) -> Result<CounterUpdate, DbError> {
        self.counter_script(scripts::CALL_AHEAD, line_id, vec![number.to_string()])
            .await
    }

    /// Increment `issued`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn issue_next(&self, line_id: LineId) -> Result<QueueState, DbError> {
        let keys = vec![keys::current(line_id), keys::issued(line_id)];
        let values = self.eval_ints(scripts::ISSUE_NEXT, keys, Vec::new()).await?;
        state_from_pair(&keys::issued(line_id), &values)
    }

    /// Decrement `issued` unless it would drop below `current`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn issue_prev(&self, line_id: LineId) -> Result<CounterUpdate, DbError> {
        self.counter_script(scripts::ISSUE_PREV, line_id, Vec::new())
            .await
    }

    /// Set `issued` unless the value is below `current`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn set_issued(&self, line_id: LineId, number: u64) -> Result<CounterUpdate, DbError> {
        self.counter_script(scripts::SET_ISSUED, line_id, vec![number.to_string()])
            .await
    }

    /// Delete the counters and passed list of a line.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn reset_counters(&self, line_id: LineId) -> Result<(), DbError> {
        let keys = vec![
            keys::current(line_id),
            keys::issued(line_id),
            keys::passed(line_id),
        ];
        let _ = self
            .eval_int(scripts::RESET_COUNTERS, keys, Vec::new())
            .await?;
        Ok(())
    }

    // =========================================================================
    // Passed numbers -- line:{id}:passed (sorted set)
    // =========================================================================

    /// Add a passed number, keeping at most `cap` entries.
    ///
    /// Returns the passed list after the insert, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn add_passed(
        &self,
        line_id: LineId,
        number: u64,
        cap: usize,
    ) -> Result<Vec<u64>, DbError> {
        let key = keys::passed(line_id);
        let members = self
            .eval_strings(
                scripts::ADD_PASSED,
                vec![key.clone()],
                vec![number.to_string(), cap.max(1).to_string()],
            )
            .await?;
        parse_numbers(&key, &members)
    }

    /// List passed numbers, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn list_passed(&self, line_id: LineId) -> Result<Vec<u64>, DbError> {
        let key = keys::passed(line_id);
        let members = self
            .eval_strings(scripts::LIST_PASSED, vec![key.clone()], Vec::new())
            .await?;
        parse_numbers(&key, &members)
    }

    /// Remove one passed number without recalling it.
    ///
    /// Returns `true` if the number was present.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn remove_passed(&self, line_id: LineId, number: u64) -> Result<bool, DbError> {
        let removed: i64 = self
            .client
            .zrem(keys::passed(line_id), number.to_string())
            .await?;
        Ok(removed > 0)
    }

    /// Drop the whole passed list of a line.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn clear_passed(&self, line_id: LineId) -> Result<(), DbError> {
        self.delete(&keys::passed(line_id)).await
    }

    /// Remove `number` from the passed list and make it current.
    ///
    /// Returns `None` if the number was not in the passed list.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn recall_passed(
        &self,
        line_id: LineId,
        number: u64,
    ) -> Result<Option<QueueState>, DbError> {
        let keys = vec![
            keys::passed(line_id),
            keys::current(line_id),
            keys::issued(line_id),
        ];
        let values: Option<Vec<i64>> = self
            .client
            .eval(scripts::RECALL_PASSED, keys, vec![number.to_string()])
            .await?;
        values
            .map(|v| state_from_pair(&keys::passed(line_id), &v))
            .transpose()
    }

    // =========================================================================
    // Subscriptions -- line:{id}:sub:{n}, line:{id}:sub:active, subscriber:{uid}
    // =========================================================================

    /// Read a subscriber's current target from the reverse index.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or the value is malformed.
    pub async fn subscription_of(&self, subscriber_id: &str) -> Result<Option<Target>, DbError> {
        let key = keys::reverse(subscriber_id);
        let value: Option<String> = self.client.get(&key).await?;
        value.map(|v| Target::decode(&key, &v)).transpose()
    }

    /// Point `subscriber_id` at `target`, evicting any previous target.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Contention`] if the reverse index keeps changing
    /// underneath, or [`DbError`] if a script fails.
    pub async fn subscribe(
        &self,
        subscriber_id: &str,
        target: Target,
        ttl_secs: u64,
    ) -> Result<SubscribeOutcome, DbError> {
        let reverse_key = keys::reverse(subscriber_id);
        for _ in 0..MAX_SCRIPT_RETRIES {
            let previous = self.subscription_of(subscriber_id).await?;
            let old = previous.unwrap_or(target);
            let keys = vec![
                keys::current(target.line_id),
                reverse_key.clone(),
                keys::subscribers(target.line_id, target.number),
                keys::active_targets(target.line_id),
                keys::subscribers(old.line_id, old.number),
                keys::active_targets(old.line_id),
            ];
            let args = vec![
                subscriber_id.to_owned(),
                target.number.to_string(),
                ttl_secs.max(1).to_string(),
                previous.map(Target::encode).unwrap_or_default(),
                target.encode(),
                old.number.to_string(),
            ];
            let values = self.eval_ints(scripts::SUBSCRIBE, keys, args).await?;
            match values.as_slice() {
                [1, _] => return Ok(SubscribeOutcome::Subscribed { previous }),
                [0, current] => {
                    return Ok(SubscribeOutcome::AlreadyPassed {
                        current: to_u64(&reverse_key, *current)?,
                    });
                }
                [-1, _] => {
                    tracing::debug!(subscriber = subscriber_id, "reverse index moved, retrying");
                }
                _ => return Err(unexpected_reply(&reverse_key, &values)),
            }
        }
        Err(DbError::Contention(reverse_key))
    }

    /// Remove a subscriber's active target.
    ///
    /// Returns the target that was dropped, or `None` if there was none.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Contention`] if the reverse index keeps changing
    /// underneath, or [`DbError`] if a script fails.
    pub async fn cancel_subscription(&self, subscriber_id: &str) -> Result<Option<Target>, DbError> {
        let reverse_key = keys::reverse(subscriber_id);
        for _ in 0..MAX_SCRIPT_RETRIES {
            let Some(target) = self.subscription_of(subscriber_id).await? else {
                return Ok(None);
            };
            let keys = vec![
                reverse_key.clone(),
                keys::subscribers(target.line_id, target.number),
                keys::active_targets(target.line_id),
            ];
            let args = vec![
                subscriber_id.to_owned(),
                target.encode(),
                target.number.to_string(),
            ];
            if self.eval_int(scripts::CANCEL_SUBSCRIPTION, keys, args).await? == 1 {
                return Ok(Some(target));
            }
        }
        Err(DbError::Contention(reverse_key))
    }

    /// List subscribers waiting for one number (non-consuming).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn subscribers(&self, line_id: LineId, number: u64) -> Result<Vec<String>, DbError> {
        let members: Vec<String> = self
            .client
            .smembers(keys::subscribers(line_id, number))
            .await?;
        Ok(members)
    }

    /// Consume every subscriber of one number.
    ///
    /// The set and its active-target entry are deleted in one step, and
    /// each member's reverse index is dropped if it still points here.
    /// Exactly one caller receives each member.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a script fails.
    pub async fn take_subscribers(
        &self,
        line_id: LineId,
        number: u64,
    ) -> Result<Vec<String>, DbError> {
        let members = self
            .eval_strings(
                scripts::TAKE_SUBSCRIBERS,
                vec![
                    keys::subscribers(line_id, number),
                    keys::active_targets(line_id),
                ],
                vec![number.to_string()],
            )
            .await?;
        let expected = Target { line_id, number }.encode();
        for member in &members {
            let _ = self
                .eval_int(
                    scripts::DEL_IF_EQUALS,
                    vec![keys::reverse(member)],
                    vec![expected.clone()],
                )
                .await?;
        }
        Ok(members)
    }

    /// Numbers of a line that currently have subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or a member is not a number.
    pub async fn active_targets(&self, line_id: LineId) -> Result<Vec<u64>, DbError> {
        let key = keys::active_targets(line_id);
        let members: Vec<String> = self.client.smembers(&key).await?;
        let mut numbers = parse_numbers(&key, &members)?;
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Drop every subscription of a line.
    ///
    /// Returns the number of subscribers removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a read or script fails.
    pub async fn clear_subscriptions(&self, line_id: LineId) -> Result<usize, DbError> {
        let mut removed = 0_usize;
        for number in self.active_targets(line_id).await? {
            removed = removed.saturating_add(self.take_subscribers(line_id, number).await?.len());
        }
        self.delete(&keys::active_targets(line_id)).await?;
        Ok(removed)
    }

    /// Remove active-target entries whose subscriber set has expired.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a read or write fails.
    pub async fn prune_active_targets(&self, line_id: LineId) -> Result<usize, DbError> {
        let active_key = keys::active_targets(line_id);
        let mut pruned = 0_usize;
        for number in self.active_targets(line_id).await? {
            let exists: i64 = self.client.exists(keys::subscribers(line_id, number)).await?;
            if exists == 0 {
                let _: i64 = self.client.srem(&active_key, number.to_string()).await?;
                pruned = pruned.saturating_add(1);
            }
        }
        Ok(pruned)
    }

    // =========================================================================
    // Sessions -- session:{token}
    // =========================================================================

    /// Store a session with a time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the write fails.
    pub async fn put_session(&self, session: &Session, ttl_secs: u64) -> Result<(), DbError> {
        let json = serde_json::to_string(session)?;
        let ttl = i64::try_from(ttl_secs.max(1)).unwrap_or(i64::MAX);
        let _: () = self
            .client
            .set(
                keys::session(&session.token),
                json.as_str(),
                Some(Expiration::EX(ttl)),
                None,
                false,
            )
            .await?;
        Ok(())
    }

    /// Read a session and refresh its time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails or the JSON is malformed.
    pub async fn touch_session(&self, token: &str, ttl_secs: u64) -> Result<Option<Session>, DbError> {
        let value: Option<String> = self
            .client
            .eval(
                scripts::TOUCH_SESSION,
                vec![keys::session(token)],
                vec![ttl_secs.max(1).to_string()],
            )
            .await?;
        value
            .map(|s| serde_json::from_str(&s).map_err(DbError::from))
            .transpose()
    }

    /// Delete a session.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete_session(&self, token: &str) -> Result<(), DbError> {
        self.delete(&keys::session(token)).await
    }

    // =========================================================================
    // Settings -- settings:{name}
    // =========================================================================

    /// Read a raw setting.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_setting(&self, name: &str) -> Result<Option<String>, DbError> {
        let value: Option<String> = self.client.get(keys::setting(name)).await?;
        Ok(value)
    }

    /// Write a raw setting.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_setting(&self, name: &str, value: &str) -> Result<(), DbError> {
        let _: () = self
            .client
            .set(keys::setting(name), value, None, None, false)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Operator log -- admin:log
    // =========================================================================

    /// Prepend an operator log entry, keeping at most `cap` entries.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the script fails.
    pub async fn push_admin_log(&self, entry: &AdminLogEntry, cap: usize) -> Result<(), DbError> {
        let json = serde_json::to_string(entry)?;
        let _ = self
            .eval_int(
                scripts::PUSH_ADMIN_LOG,
                vec![keys::ADMIN_LOG.to_owned()],
                vec![json, cap.max(1).to_string()],
            )
            .await?;
        Ok(())
    }

    /// Read the operator log, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails or an entry is malformed.
    pub async fn admin_log(&self) -> Result<Vec<AdminLogEntry>, DbError> {
        let values: Vec<String> = self.client.lrange(keys::ADMIN_LOG, 0, -1).await?;
        let mut entries = Vec::with_capacity(values.len());
        for v in &values {
            entries.push(serde_json::from_str(v)?);
        }
        Ok(entries)
    }

    /// Delete the operator log.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn clear_admin_log(&self) -> Result<(), DbError> {
        self.delete(keys::ADMIN_LOG).await
    }

    // =========================================================================
    // Rate limiting and cross-instance locks
    // =========================================================================

    /// Count a hit for `caller` in the current fixed window.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn rate_hit(&self, caller: &str, window_secs: u64) -> Result<u64, DbError> {
        let key = keys::rate_limit(caller);
        let count = self
            .eval_int(
                scripts::RATE_HIT,
                vec![key.clone()],
                vec![window_secs.max(1).to_string()],
            )
            .await?;
        to_u64(&key, count)
    }

    /// Take the one-shot lock `name`; `true` only for the first caller
    /// within `ttl_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the script fails.
    pub async fn claim_once(&self, name: &str, ttl_secs: u64) -> Result<bool, DbError> {
        let claimed = self
            .eval_int(
                scripts::CLAIM_ONCE,
                vec![keys::claim(name)],
                vec![ttl_secs.max(1).to_string()],
            )
            .await?;
        Ok(claimed == 1)
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

// =============================================================================
// Reply decoding
// =============================================================================

fn unexpected_reply(key: &str, values: &[i64]) -> DbError {
    DbError::Corrupt {
        key: key.to_owned(),
        reason: format!("unexpected script reply {values:?}"),
    }
}

fn to_u64(key: &str, value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|e| DbError::Corrupt {
        key: key.to_owned(),
        reason: format!("negative counter {value}: {e}"),
    })
}

fn parse_counter(key: &str, value: Option<&str>) -> Result<u64, DbError> {
    value.map_or(Ok(0), |v| {
        v.parse::<u64>().map_err(|e| DbError::Corrupt {
            key: key.to_owned(),
            reason: format!("not a counter: {e}"),
        })
    })
}

fn parse_numbers(key: &str, members: &[String]) -> Result<Vec<u64>, DbError> {
    members
        .iter()
        .map(|m| parse_counter(key, Some(m.as_str())))
        .collect()
}

fn state_from_pair(key: &str, values: &[i64]) -> Result<QueueState, DbError> {
    match values {
        [current, issued] => Ok(QueueState::new(
            to_u64(key, *current)?,
            to_u64(key, *issued)?,
        )),
        _ => Err(unexpected_reply(key, values)),
    }
}

impl CounterUpdate {
    fn from_script(key: &str, values: &[i64]) -> Result<Self, DbError> {
        match values {
            [applied, current, issued] => Ok(Self {
                applied: *applied == 1,
                state: QueueState::new(to_u64(key, *current)?, to_u64(key, *issued)?),
            }),
            _ => Err(unexpected_reply(key, values)),
        }
    }
}
