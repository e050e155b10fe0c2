//! Wait-time estimation from call history.
//!
//! The estimate is the average interval between the most recent call
//! records of the current local day, in minutes with one decimal. Fewer
//! than two records give `0`, meaning unknown.

use std::collections::HashMap;
use std::time::Duration;

use callsys_db::RecordStore;
use callsys_types::LineId;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::clock::LocalClock;
use crate::config::EstimatorConfig;

const MILLIS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct CachedEstimate {
    minutes: Decimal,
    computed_at: Instant,
}

/// Per-line wait-time cache backed by the history log.
#[derive(Debug)]
pub struct WaitEstimator {
    records: RecordStore,
    clock: LocalClock,
    window: usize,
    ttl: Duration,
    cache: Mutex<HashMap<LineId, CachedEstimate>>,
}

impl WaitEstimator {
    /// Create an estimator reading from `records`.
    pub fn new(records: RecordStore, clock: LocalClock, config: &EstimatorConfig) -> Self {
        Self {
            records,
            clock,
            window: config.window.max(2),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Estimate for `line_id`.
    ///
    /// A cached value younger than the TTL is returned unless `force` is
    /// set. When the history store fails, the last good value is returned.
    pub async fn estimate(&self, line_id: LineId, force: bool) -> Decimal {
        if !force {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache
                .get(&line_id)
                .filter(|hit| hit.computed_at.elapsed() < self.ttl)
            {
                return hit.minutes;
            }
        }

        match self.records.recent_call_times(line_id, self.window).await {
            Ok(times) => {
                let today = self.clock.date(Utc::now());
                let todays: Vec<i64> = times
                    .into_iter()
                    .filter(|ts| {
                        chrono::DateTime::from_timestamp_millis(*ts)
                            .is_some_and(|at| self.clock.date(at) == today)
                    })
                    .collect();
                let minutes = average_interval(&todays);
                debug!(line_id = %line_id, samples = todays.len(), %minutes, "wait estimate computed");
                self.cache.lock().await.insert(
                    line_id,
                    CachedEstimate {
                        minutes,
                        computed_at: Instant::now(),
                    },
                );
                minutes
            }
            Err(e) => {
                let fallback = self
                    .cache
                    .lock()
                    .await
                    .get(&line_id)
                    .map_or(Decimal::ZERO, |c| c.minutes);
                warn!(line_id = %line_id, error = %e, %fallback, "wait estimate fell back to cached value");
                fallback
            }
        }
    }

    /// Forget the cached value of a line.
    pub async fn invalidate(&self, line_id: LineId) {
        self.cache.lock().await.remove(&line_id);
    }
}

/// Average interval in minutes between timestamps given newest first.
///
/// Rounded to one decimal; `0` for fewer than two timestamps.
pub fn average_interval(times_newest_first: &[i64]) -> Decimal {
    let (Some(newest), Some(oldest)) = (times_newest_first.first(), times_newest_first.last())
    else {
        return Decimal::ZERO;
    };
    let Some(gaps) = times_newest_first
        .len()
        .checked_sub(1)
        .filter(|g| *g > 0)
        .and_then(|g| i64::try_from(g).ok())
    else {
        return Decimal::ZERO;
    };
    let span_ms = newest.saturating_sub(*oldest).max(0);
    gaps.checked_mul(MILLIS_PER_MINUTE)
        .and_then(|denominator| Decimal::from(span_ms).checked_div(Decimal::from(denominator)))
        .map_or(Decimal::ZERO, |minutes| minutes.round_dp(1))
}
