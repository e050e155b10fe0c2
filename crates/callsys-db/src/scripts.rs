//! Server-side Lua scripts for the invariant-preserving operations.
//!
//! Every conditional read-modify-write on queue state runs as a single
//! script so concurrent operators on different server instances cannot
//! interleave between the check and the write. Scripts only touch keys
//! passed in `KEYS` (`Dragonfly` rejects undeclared keys).
//!
//! Counter scripts return `{applied, current, issued}` or `{current, issued}`
//! integer tables. A missing counter reads as `0`.

/// Increment `current` only while `current < issued`.
///
/// `KEYS`: current, issued. Returns `{applied, current, issued}`.
pub const CALL_NEXT: &str = r"
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
local iss = tonumber(redis.call('GET', KEYS[2]) or '0')
if cur >= iss then
  return {0, cur, iss}
end
cur = redis.call('INCR', KEYS[1])
return {1, cur, iss}
";

/// Decrement `current`, never below zero.
///
/// `KEYS`: current, issued. Returns `{applied, current, issued}`.
pub const CALL_PREV: &str = r"
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
local iss = tonumber(redis.call('GET', KEYS[2]) or '0')
if cur <= 0 then
  return {0, 0, iss}
end
cur = redis.call('DECR', KEYS[1])
return {1, cur, iss}
";

/// Set `current`, raising `issued` when it would fall behind.
///
/// `KEYS`: current, issued. `ARGV`: number. Returns `{current, issued}`.
pub const SET_CURRENT: &str = r"
local n = tonumber(ARGV[1])
local iss = tonumber(redis.call('GET', KEYS[2]) or '0')
redis.call('SET', KEYS[1], n)
if n > iss then
  redis.call('SET', KEYS[2], n)
  iss = n
end
return {n, iss}
";

/// Jump `current` forward to an appointment number.
///
/// Applies only while `current < n`; raises `issued` when it would fall
/// behind. `KEYS`: current, issued. `ARGV`: number. Returns
/// `{applied, current, issued}`.
pub const CALL_AHEAD: &str = r"
local n = tonumber(ARGV[1])
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
local iss = tonumber(redis.call('GET', KEYS[2]) or '0')
if cur >= n then
  return {0, cur, iss}
end
redis.call('SET', KEYS[1], n)
if n > iss then
  redis.call('SET', KEYS[2], n)
  iss = n
end
return {1, n, iss}
";

/// Increment `issued` (starting from `current` if it lags behind).
///
/// `KEYS`: current, issued. Returns `{current, issued}`.
pub const ISSUE_NEXT: &str = r"
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
local iss = tonumber(redis.call('GET', KEYS[2]) or '0')
if iss < cur then
  iss = cur
end
iss = iss + 1
redis.call('SET', KEYS[2], iss)
return {cur, iss}
";

/// Decrement `issued` only while the result stays `>= current`.
///
/// `KEYS`: current, issued. Returns `{applied, current, issued}`.
pub const ISSUE_PREV: &str = r"
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
local iss = tonumber(redis.call('GET', KEYS[2]) or '0')
if iss - 1 < cur then
  return {0, cur, iss}
end
iss = iss - 1
redis.call('SET', KEYS[2], iss)
return {1, cur, iss}
";

/// Set `issued` only when the value is `>= current`.
///
/// `KEYS`: current, issued. `ARGV`: number. Returns `{applied, current, issued}`.
pub const SET_ISSUED: &str = r"
local n = tonumber(ARGV[1])
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
local iss = tonumber(redis.call('GET', KEYS[2]) or '0')
if n < cur then
  return {0, cur, iss}
end
redis.call('SET', KEYS[2], n)
return {1, cur, n}
";

/// Delete counters and the passed list of one line.
///
/// `KEYS`: current, issued, passed.
pub const RESET_COUNTERS: &str = r"
redis.call('DEL', KEYS[1], KEYS[2], KEYS[3])
return 1
";

/// Add a passed number and evict the lowest entries beyond the cap.
///
/// `KEYS`: passed. `ARGV`: number, cap. Returns the remaining members.
pub const ADD_PASSED: &str = r"
redis.call('ZADD', KEYS[1], ARGV[1], ARGV[1])
local cap = tonumber(ARGV[2])
redis.call('ZREMRANGEBYRANK', KEYS[1], 0, -(cap + 1))
return redis.call('ZRANGE', KEYS[1], 0, -1)
";

/// List the passed set in ascending order.
///
/// `KEYS`: passed.
pub const LIST_PASSED: &str = r"
return redis.call('ZRANGE', KEYS[1], 0, -1)
";

/// Remove a passed number and make it the current number.
///
/// `KEYS`: passed, current, issued. `ARGV`: number.
/// Returns nil when the number was not in the passed set.
pub const RECALL_PASSED: &str = r"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
  return nil
end
local n = tonumber(ARGV[1])
local iss = tonumber(redis.call('GET', KEYS[3]) or '0')
redis.call('SET', KEYS[2], n)
if n > iss then
  redis.call('SET', KEYS[3], n)
  iss = n
end
return {n, iss}
";

/// Point a subscriber at a new target, evicting the previous one.
///
/// `KEYS`: current, reverse index, new set, new active set, old set,
/// old active set. `ARGV`: subscriber, number, ttl seconds, expected
/// reverse value (`''` for none), new reverse value, old number.
///
/// Returns `{1, current}` on success, `{0, current}` when the target has
/// already been reached, `{-1, current}` when the reverse index changed
/// since it was read (caller retries).
pub const SUBSCRIBE: &str = r"
local cur = tonumber(redis.call('GET', KEYS[1]) or '0')
local n = tonumber(ARGV[2])
if n <= cur then
  return {0, cur}
end
local existing = redis.call('GET', KEYS[2]) or ''
if existing ~= ARGV[4] then
  return {-1, cur}
end
if existing ~= '' then
  redis.call('SREM', KEYS[5], ARGV[1])
  if redis.call('SCARD', KEYS[5]) == 0 then
    redis.call('SREM', KEYS[6], ARGV[6])
  end
end
redis.call('SADD', KEYS[3], ARGV[1])
redis.call('EXPIRE', KEYS[3], ARGV[3])
redis.call('SADD', KEYS[4], ARGV[2])
redis.call('SET', KEYS[2], ARGV[5], 'EX', ARGV[3])
return {1, cur}
";

/// Drop a subscriber's active target.
///
/// `KEYS`: reverse index, set, active set. `ARGV`: subscriber, expected
/// reverse value, number. Returns `1` on success, `-1` on a stale read.
pub const CANCEL_SUBSCRIPTION: &str = r"
local existing = redis.call('GET', KEYS[1]) or ''
if existing ~= ARGV[2] then
  return -1
end
redis.call('SREM', KEYS[2], ARGV[1])
if redis.call('SCARD', KEYS[2]) == 0 then
  redis.call('SREM', KEYS[3], ARGV[3])
end
redis.call('DEL', KEYS[1])
return 1
";

/// Atomically read and delete every subscriber of one target.
///
/// `KEYS`: set, active set. `ARGV`: number. Returns the members.
pub const TAKE_SUBSCRIBERS: &str = r"
local members = redis.call('SMEMBERS', KEYS[1])
redis.call('DEL', KEYS[1])
redis.call('SREM', KEYS[2], ARGV[1])
return members
";

/// Delete a key only if it still holds the expected value.
///
/// `KEYS`: key. `ARGV`: expected value. Returns `1` when deleted.
pub const DEL_IF_EQUALS: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('DEL', KEYS[1])
  return 1
end
return 0
";

/// Read a session and extend its time-to-live.
///
/// `KEYS`: session. `ARGV`: ttl seconds. Returns the JSON or nil.
pub const TOUCH_SESSION: &str = r"
local v = redis.call('GET', KEYS[1])
if v then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
  return v
end
return nil
";

/// Prepend an operator log entry and trim to the cap.
///
/// `KEYS`: log. `ARGV`: JSON entry, cap.
pub const PUSH_ADMIN_LOG: &str = r"
redis.call('LPUSH', KEYS[1], ARGV[1])
redis.call('LTRIM', KEYS[1], 0, tonumber(ARGV[2]) - 1)
return 1
";

/// Fixed-window hit counter.
///
/// `KEYS`: counter. `ARGV`: window seconds. Returns the count in the window.
pub const RATE_HIT: &str = r"
local c = redis.call('INCR', KEYS[1])
if c == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return c
";

/// Take a one-shot lock.
///
/// `KEYS`: lock. `ARGV`: ttl seconds. Returns `1` for the first caller.
pub const CLAIM_ONCE: &str = r"
if redis.call('SET', KEYS[1], '1', 'NX', 'EX', ARGV[1]) then
  return 1
end
return 0
";
