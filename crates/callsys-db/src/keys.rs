//! Key layout shared by the `Dragonfly` store and its in-process twin.
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `line:{id}:current` | Integer | Last number called |
//! | `line:{id}:issued` | Integer | Highest number handed out |
//! | `line:{id}:passed` | Sorted set | Passed numbers scored by number |
//! | `line:{id}:sub:{n}` | Set (TTL) | Subscribers waiting for number `n` |
//! | `line:{id}:sub:active` | Set | Numbers with at least one subscriber |
//! | `subscriber:{uid}` | String (TTL) | Reverse index `{line_id}:{n}` |
//! | `session:{token}` | JSON (TTL) | Operator session |
//! | `settings:{name}` | String/JSON | System flags and featured content |
//! | `admin:log` | List | Operator log, newest first |
//! | `ratelimit:{caller}` | Integer (TTL) | Intake hits in the current window |
//! | `claim:{name}` | String (TTL) | One-shot cross-instance lock |

use callsys_types::LineId;

use crate::error::DbError;

/// Key of the operator log list.
pub const ADMIN_LOG: &str = "admin:log";

/// `line:{id}:current`
pub fn current(line_id: LineId) -> String {
    format!("line:{line_id}:current")
}

/// `line:{id}:issued`
pub fn issued(line_id: LineId) -> String {
    format!("line:{line_id}:issued")
}

/// `line:{id}:passed`
pub fn passed(line_id: LineId) -> String {
    format!("line:{line_id}:passed")
}

/// `line:{id}:sub:{n}`
pub fn subscribers(line_id: LineId, number: u64) -> String {
    format!("line:{line_id}:sub:{number}")
}

/// `line:{id}:sub:active`
pub fn active_targets(line_id: LineId) -> String {
    format!("line:{line_id}:sub:active")
}

/// `subscriber:{uid}`
pub fn reverse(subscriber_id: &str) -> String {
    format!("subscriber:{subscriber_id}")
}

/// `session:{token}`
pub fn session(token: &str) -> String {
    format!("session:{token}")
}

/// `settings:{name}`
pub fn setting(name: &str) -> String {
    format!("settings:{name}")
}

/// `ratelimit:{caller}`
pub fn rate_limit(caller: &str) -> String {
    format!("ratelimit:{caller}")
}

/// `claim:{name}`
pub fn claim(name: &str) -> String {
    format!("claim:{name}")
}

/// A subscriber's tracked `(line, number)` pair as stored in the reverse
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    /// Line being tracked.
    pub line_id: LineId,
    /// Number being waited for.
    pub number: u64,
}

impl Target {
    /// Encode as `{line_id}:{number}`.
    pub fn encode(self) -> String {
        format!("{}:{}", self.line_id, self.number)
    }

    /// Decode the reverse-index representation.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] if the value is malformed.
    pub fn decode(key: &str, value: &str) -> Result<Self, DbError> {
        let corrupt = |reason: &str| DbError::Corrupt {
            key: key.to_owned(),
            reason: reason.to_owned(),
        };
        let (line, number) = value
            .rsplit_once(':')
            .ok_or_else(|| corrupt("missing separator"))?;
        let line_id = line
            .parse::<LineId>()
            .map_err(|e| corrupt(&format!("bad line id: {e}")))?;
        let number = number
            .parse::<u64>()
            .map_err(|e| corrupt(&format!("bad number: {e}")))?;
        Ok(Self { line_id, number })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn target_round_trips_through_reverse_value() {
        let target = Target {
            line_id: LineId::new(),
            number: 42,
        };
        let decoded = Target::decode("subscriber:u1", &target.encode()).unwrap();
        assert_eq!(decoded, target);
    }

    #[test]
    fn malformed_reverse_value_is_corrupt() {
        assert!(matches!(
            Target::decode("subscriber:u1", "nonsense"),
            Err(DbError::Corrupt { .. })
        ));
        assert!(Target::decode("subscriber:u1", "not-a-uuid:5").is_err());
    }

    #[test]
    fn keys_are_scoped_per_line() {
        let a = LineId::new();
        let b = LineId::new();
        assert_ne!(current(a), current(b));
        assert_eq!(subscribers(a, 7), format!("line:{a}:sub:7"));
    }
}
