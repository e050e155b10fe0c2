//! Local wall clock.
//!
//! History dates, hourly statistics, business hours and the daily reset
//! all use a fixed UTC offset from configuration.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Timelike, Utc};

use crate::config::{BusinessHoursConfig, ClockConfig};

/// Converts UTC instants to local dates and hours.
#[derive(Debug, Clone)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    /// Build from configuration; an out-of-range offset falls back to UTC.
    pub fn new(config: &ClockConfig) -> Self {
        let offset = config
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    /// Clock pinned at UTC.
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// `at` in local time.
    pub fn local(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.offset)
    }

    /// Local calendar date of `at`.
    pub fn date(&self, at: DateTime<Utc>) -> NaiveDate {
        self.local(at).date_naive()
    }

    /// Local calendar date of `at` as `YYYY-MM-DD`.
    pub fn date_str(&self, at: DateTime<Utc>) -> String {
        self.date(at).format("%Y-%m-%d").to_string()
    }

    /// The instant of local `hour:minute` on `date`.
    pub fn at_local(&self, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
        date.and_hms_opt(hour, minute, 0)?
            .and_local_timezone(self.offset)
            .single()
            .map(|at| at.with_timezone(&Utc))
    }

    /// Local hour (0-23) of a Unix millisecond timestamp.
    pub fn hour_of_millis(&self, timestamp_ms: i64) -> Option<u32> {
        DateTime::from_timestamp_millis(timestamp_ms).map(|at| self.local(at).hour())
    }

    /// Whether `at` falls inside the configured opening hours.
    ///
    /// Always `true` while the restriction is disabled. A window whose
    /// close hour is before its open hour wraps past midnight.
    pub fn within_business_hours(&self, hours: &BusinessHoursConfig, at: DateTime<Utc>) -> bool {
        if !hours.enabled {
            return true;
        }
        let hour = self.local(at).hour();
        if hours.open_hour <= hours.close_hour {
            hour >= hours.open_hour && hour < hours.close_hour
        } else {
            hour >= hours.open_hour || hour < hours.close_hour
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, 0)
            .single()
            .unwrap_or_default()
    }

    #[test]
    fn offset_moves_the_local_date() {
        let clock = LocalClock::new(&ClockConfig {
            utc_offset_minutes: 480,
        });
        assert_eq!(clock.date_str(at(20, 0)), "2026-03-02");
        assert_eq!(LocalClock::utc().date_str(at(20, 0)), "2026-03-01");
    }

    #[test]
    fn hour_of_millis_uses_local_time() {
        let clock = LocalClock::new(&ClockConfig {
            utc_offset_minutes: -60,
        });
        assert_eq!(clock.hour_of_millis(at(10, 30).timestamp_millis()), Some(9));
    }

    #[test]
    fn business_hours_window() {
        let clock = LocalClock::utc();
        let mut hours = BusinessHoursConfig {
            enabled: true,
            open_hour: 9,
            close_hour: 17,
        };
        assert!(clock.within_business_hours(&hours, at(9, 0)));
        assert!(!clock.within_business_hours(&hours, at(17, 0)));
        assert!(!clock.within_business_hours(&hours, at(3, 0)));

        hours.open_hour = 22;
        hours.close_hour = 2;
        assert!(clock.within_business_hours(&hours, at(23, 0)));
        assert!(clock.within_business_hours(&hours, at(1, 0)));
        assert!(!clock.within_business_hours(&hours, at(12, 0)));

        hours.enabled = false;
        assert!(clock.within_business_hours(&hours, at(12, 0)));
    }
}
