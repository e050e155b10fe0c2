//! History queries and daily statistics.

use callsys_db::{RecordStore, StateStore};
use callsys_types::{AdminLogEntry, DailyStats, HistoryRecord, LineId};
use chrono::NaiveDate;

use crate::clock::LocalClock;
use crate::error::QueueError;

const HOURS_PER_DAY: usize = 24;

/// Read-only access to history and the operator log.
#[derive(Debug, Clone)]
pub struct Reports {
    records: RecordStore,
    state: StateStore,
    clock: LocalClock,
}

impl Reports {
    /// Reports over the given stores.
    pub const fn new(records: RecordStore, state: StateStore, clock: LocalClock) -> Self {
        Self {
            records,
            state,
            clock,
        }
    }

    /// History records of the local dates `from..=to`, oldest first.
    pub async fn history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        line_id: Option<LineId>,
    ) -> Result<Vec<HistoryRecord>, QueueError> {
        if from > to {
            return Err(QueueError::InvalidArgument(format!(
                "range start {from} is after its end {to}"
            )));
        }
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        Ok(self.records.history_range(&from, &to, line_id).await?)
    }

    /// Calls of one local day bucketed by local hour.
    pub async fn daily_stats(
        &self,
        date: NaiveDate,
        line_id: Option<LineId>,
    ) -> Result<DailyStats, QueueError> {
        let records = self.history(date, date, line_id).await?;
        Ok(hourly_calls(&self.clock, date, &records))
    }

    /// Operator log, newest first.
    pub async fn admin_log(&self) -> Result<Vec<AdminLogEntry>, QueueError> {
        Ok(self.state.admin_log().await?)
    }

    /// Delete the operator log.
    pub async fn clear_admin_log(&self) -> Result<(), QueueError> {
        Ok(self.state.clear_admin_log().await?)
    }
}

/// Count call records per local hour.
pub fn hourly_calls(clock: &LocalClock, date: NaiveDate, records: &[HistoryRecord]) -> DailyStats {
    let mut hourly = vec![0_u32; HOURS_PER_DAY];
    let mut total = 0_u32;
    for record in records.iter().filter(|r| r.action.is_call()) {
        let Some(slot) = clock
            .hour_of_millis(record.timestamp_ms)
            .and_then(|h| usize::try_from(h).ok())
            .and_then(|h| hourly.get_mut(h))
        else {
            continue;
        };
        *slot = slot.saturating_add(1);
        total = total.saturating_add(1);
    }
    DailyStats {
        date: date.format("%Y-%m-%d").to_string(),
        total,
        hourly,
    }
}
