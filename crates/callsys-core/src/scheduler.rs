//! Background tasks: the daily rollover and the expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::LocalClock;
use crate::config::DailyResetConfig;
use crate::system::QueueSystem;

/// Period of the expiry sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The first configured reset instant strictly after `now`.
///
/// Returns `None` when the configured time does not exist.
pub fn next_reset_after(
    clock: &LocalClock,
    config: &DailyResetConfig,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let today = clock.date(now);
    let candidate = clock.at_local(today, config.hour, config.minute)?;
    if candidate > now {
        return Some(candidate);
    }
    let tomorrow = today.checked_add_days(Days::new(1))?;
    clock.at_local(tomorrow, config.hour, config.minute)
}

/// Spawn the daily rollover loop; `None` when disabled.
pub fn spawn_daily_reset(system: Arc<QueueSystem>) -> Option<JoinHandle<()>> {
    let config = system.config().daily_reset.clone();
    if !config.enabled {
        info!("daily reset disabled");
        return None;
    }
    let handle = tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = next_reset_after(system.clock(), &config, now) else {
                error!(
                    hour = config.hour,
                    minute = config.minute,
                    "daily reset time is invalid, scheduler stopped"
                );
                return;
            };
            let wait = next.signed_duration_since(now).to_std().unwrap_or(Duration::ZERO);
            info!(at = %next, "next daily reset scheduled");
            tokio::time::sleep(wait).await;

            let date = system.clock().date(next);
            if let Err(e) = system.run_daily_reset(date).await {
                warn!(%date, error = %e, "daily reset failed");
            }
        }
    });
    Some(handle)
}

/// Spawn the once-per-minute sweep of expired entries.
pub fn spawn_sweeper(system: Arc<QueueSystem>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match system.sweep().await {
                Ok(0) => {}
                Ok(evicted) => debug!(evicted, "sweep evicted expired entries"),
                Err(e) => warn!(error = %e, "sweep failed"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::config::ClockConfig;

    fn reset_at(hour: u32, minute: u32) -> DailyResetConfig {
        DailyResetConfig {
            enabled: true,
            hour,
            minute,
        }
    }

    #[test]
    fn later_today_when_not_yet_passed() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap();
        let next = next_reset_after(&LocalClock::utc(), &reset_at(4, 30), now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 4, 30, 0).unwrap());
    }

    #[test]
    fn tomorrow_when_passed_or_exact() {
        let clock = LocalClock::utc();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 4, 30, 0).unwrap();
        let next = next_reset_after(&clock, &reset_at(4, 30), now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 4, 30, 0).unwrap());
    }

    #[test]
    fn follows_local_offset() {
        let clock = LocalClock::new(&ClockConfig {
            utc_offset_minutes: 480,
        });
        // 20:00 UTC is 04:00 local on the next day.
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap();
        let next = next_reset_after(&clock, &reset_at(0, 0), now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).unwrap());
    }

    #[test]
    fn invalid_time_has_no_next() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap();
        assert!(next_reset_after(&LocalClock::utc(), &reset_at(25, 0), now).is_none());
    }
}
