//! Backend-agnostic handle to the durable records: lines, history and
//! appointments.
//!
//! Mirrors [`crate::StateStore`]: enum dispatch over `PostgreSQL` and an
//! in-process twin used by tests and single-node development.

use std::sync::Arc;

use callsys_types::{
    Appointment, AppointmentId, AppointmentStatus, HistoryRecord, LineId, QueueLine,
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::appointment_store::AppointmentStore;
use crate::error::DbError;
use crate::history_store::HistoryStore;
use crate::line_store::LineStore;
use crate::postgres::PostgresPool;

/// Durable records, backed by `PostgreSQL` or held in process.
#[derive(Clone)]
pub enum RecordStore {
    /// `PostgreSQL` pool.
    Postgres(PostgresPool),
    /// In-process records.
    Memory(MemoryRecords),
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RecordStore").field(&self.backend()).finish()
    }
}

impl RecordStore {
    /// Fresh in-process records.
    pub fn in_memory() -> Self {
        Self::Memory(MemoryRecords::default())
    }

    /// Backend name for logs.
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    // -------------------------------------------------------------------------
    // Lines
    // -------------------------------------------------------------------------

    /// All lines, oldest first.
    pub async fn list_lines(&self) -> Result<Vec<QueueLine>, DbError> {
        match self {
            Self::Postgres(pg) => LineStore::new(pg.pool()).list().await,
            Self::Memory(m) => Ok(m.inner.lock().await.lines.clone()),
        }
    }

    /// Insert a line.
    pub async fn insert_line(&self, line: &QueueLine) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => LineStore::new(pg.pool()).insert(line).await,
            Self::Memory(m) => {
                m.inner.lock().await.lines.push(line.clone());
                Ok(())
            }
        }
    }

    /// Delete a line and its appointments; `true` if it existed.
    pub async fn delete_line(&self, id: LineId) -> Result<bool, DbError> {
        match self {
            Self::Postgres(pg) => LineStore::new(pg.pool()).delete(id).await,
            Self::Memory(m) => {
                let mut inner = m.inner.lock().await;
                let before = inner.lines.len();
                inner.lines.retain(|l| l.id != id);
                inner.appointments.retain(|a| a.line_id != id);
                Ok(inner.lines.len() < before)
            }
        }
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    /// Append one history record.
    pub async fn append_history(&self, record: &HistoryRecord) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => HistoryStore::new(pg.pool()).append(record).await,
            Self::Memory(m) => {
                m.inner.lock().await.history.push(record.clone());
                Ok(())
            }
        }
    }

    /// History with local dates in `from..=to`, oldest first.
    pub async fn history_range(
        &self,
        from: &str,
        to: &str,
        line_id: Option<LineId>,
    ) -> Result<Vec<HistoryRecord>, DbError> {
        match self {
            Self::Postgres(pg) => {
                HistoryStore::new(pg.pool())
                    .by_date_range(from, to, line_id)
                    .await
            }
            Self::Memory(m) => {
                let inner = m.inner.lock().await;
                let mut records: Vec<HistoryRecord> = inner
                    .history
                    .iter()
                    .filter(|r| r.date_str.as_str() >= from && r.date_str.as_str() <= to)
                    .filter(|r| line_id.is_none_or(|id| r.line_id == id))
                    .cloned()
                    .collect();
                records.sort_by_key(|r| r.timestamp_ms);
                Ok(records)
            }
        }
    }

    /// Timestamps of the `limit` most recent call records, newest first.
    pub async fn recent_call_times(&self, line_id: LineId, limit: usize) -> Result<Vec<i64>, DbError> {
        match self {
            Self::Postgres(pg) => {
                HistoryStore::new(pg.pool())
                    .recent_call_times(line_id, limit)
                    .await
            }
            Self::Memory(m) => {
                let inner = m.inner.lock().await;
                let mut times: Vec<i64> = inner
                    .history
                    .iter()
                    .filter(|r| r.line_id == line_id && r.action.is_call())
                    .map(|r| r.timestamp_ms)
                    .collect();
                times.sort_unstable_by(|a, b| b.cmp(a));
                times.truncate(limit);
                Ok(times)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Appointments
    // -------------------------------------------------------------------------

    /// Insert an appointment.
    pub async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => AppointmentStore::new(pg.pool()).insert(appointment).await,
            Self::Memory(m) => {
                m.inner.lock().await.appointments.push(appointment.clone());
                Ok(())
            }
        }
    }

    /// Delete an appointment; `true` if it existed.
    pub async fn delete_appointment(&self, id: AppointmentId) -> Result<bool, DbError> {
        match self {
            Self::Postgres(pg) => AppointmentStore::new(pg.pool()).delete(id).await,
            Self::Memory(m) => {
                let mut inner = m.inner.lock().await;
                let before = inner.appointments.len();
                inner.appointments.retain(|a| a.id != id);
                Ok(inner.appointments.len() < before)
            }
        }
    }

    /// Appointments ordered by scheduled time.
    pub async fn list_appointments(
        &self,
        line_id: Option<LineId>,
    ) -> Result<Vec<Appointment>, DbError> {
        match self {
            Self::Postgres(pg) => AppointmentStore::new(pg.pool()).list(line_id).await,
            Self::Memory(m) => {
                let inner = m.inner.lock().await;
                let mut list: Vec<Appointment> = inner
                    .appointments
                    .iter()
                    .filter(|a| line_id.is_none_or(|id| a.line_id == id))
                    .cloned()
                    .collect();
                list.sort_by_key(|a| (a.scheduled_at, a.number));
                Ok(list)
            }
        }
    }

    /// Claim the earliest due appointment ahead of `current`, cancelling
    /// stale ones on the way.
    pub async fn claim_due_appointment(
        &self,
        line_id: LineId,
        now: DateTime<Utc>,
        current: u64,
    ) -> Result<Option<Appointment>, DbError> {
        match self {
            Self::Postgres(pg) => {
                AppointmentStore::new(pg.pool())
                    .claim_due(line_id, now, current)
                    .await
            }
            Self::Memory(m) => Ok(m.claim_due(line_id, now, current).await),
        }
    }

    /// Return a claimed appointment to pending; `true` if it was called.
    pub async fn release_appointment(&self, id: AppointmentId) -> Result<bool, DbError> {
        match self {
            Self::Postgres(pg) => AppointmentStore::new(pg.pool()).release(id).await,
            Self::Memory(m) => {
                let mut inner = m.inner.lock().await;
                let Some(appointment) = inner
                    .appointments
                    .iter_mut()
                    .find(|a| a.id == id && a.status == AppointmentStatus::Called)
                else {
                    return Ok(false);
                };
                appointment.status = AppointmentStatus::Pending;
                Ok(true)
            }
        }
    }

    /// Cancel every pending appointment of a line; returns how many.
    pub async fn cancel_pending_appointments(&self, line_id: LineId) -> Result<u64, DbError> {
        match self {
            Self::Postgres(pg) => AppointmentStore::new(pg.pool()).cancel_pending(line_id).await,
            Self::Memory(m) => {
                let mut inner = m.inner.lock().await;
                let mut cancelled = 0_u64;
                for a in inner
                    .appointments
                    .iter_mut()
                    .filter(|a| a.line_id == line_id && a.status == AppointmentStatus::Pending)
                {
                    a.status = AppointmentStatus::Cancelled;
                    cancelled = cancelled.saturating_add(1);
                }
                Ok(cancelled)
            }
        }
    }
}

#[derive(Debug, Default)]
struct RecordsInner {
    lines: Vec<QueueLine>,
    history: Vec<HistoryRecord>,
    appointments: Vec<Appointment>,
}

/// In-process lines, history and appointments.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecords {
    inner: Arc<Mutex<RecordsInner>>,
}

impl MemoryRecords {
    async fn claim_due(
        &self,
        line_id: LineId,
        now: DateTime<Utc>,
        current: u64,
    ) -> Option<Appointment> {
        let mut inner = self.inner.lock().await;
        let mut due: Vec<&mut Appointment> = inner
            .appointments
            .iter_mut()
            .filter(|a| a.line_id == line_id && a.is_due(now))
            .collect();
        due.sort_by_key(|a| (a.scheduled_at, a.number));
        for appointment in due {
            if appointment.number > current {
                appointment.status = AppointmentStatus::Called;
                return Some(appointment.clone());
            }
            appointment.status = AppointmentStatus::Cancelled;
            tracing::info!(
                line_id = %line_id,
                number = appointment.number,
                current,
                "Cancelled stale appointment"
            );
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;

    use super::*;
    use callsys_types::HistoryAction;

    fn appointment(line_id: LineId, number: u64, minutes_ago: i64) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: AppointmentId::new(),
            line_id,
            number,
            scheduled_at: now - Duration::minutes(minutes_ago),
            status: AppointmentStatus::Pending,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn claim_skips_and_cancels_stale_appointments() {
        let records = RecordStore::in_memory();
        let line = LineId::new();
        records.insert_appointment(&appointment(line, 3, 10)).await.unwrap();
        records.insert_appointment(&appointment(line, 8, 5)).await.unwrap();
        records.insert_appointment(&appointment(line, 9, -30)).await.unwrap();

        let claimed = records
            .claim_due_appointment(line, Utc::now(), 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.number, 8);
        assert_eq!(claimed.status, AppointmentStatus::Called);

        let statuses: Vec<(u64, AppointmentStatus)> = records
            .list_appointments(Some(line))
            .await
            .unwrap()
            .into_iter()
            .map(|a| (a.number, a.status))
            .collect();
        assert!(statuses.contains(&(3, AppointmentStatus::Cancelled)));
        assert!(statuses.contains(&(9, AppointmentStatus::Pending)));
    }

    #[tokio::test]
    async fn recent_call_times_only_count_calls_newest_first() {
        let records = RecordStore::in_memory();
        let line = LineId::new();
        for (ts, action) in [
            (1_000, HistoryAction::Call),
            (2_000, HistoryAction::Issue),
            (3_000, HistoryAction::AppointmentCall),
            (4_000, HistoryAction::Call),
        ] {
            records
                .append_history(&HistoryRecord {
                    line_id: line,
                    date_str: "2026-03-01".to_owned(),
                    timestamp_ms: ts,
                    number: 1,
                    action,
                    operator: "alice".to_owned(),
                    wait_estimate_min: Decimal::ZERO,
                })
                .await
                .unwrap();
        }
        assert_eq!(
            records.recent_call_times(line, 2).await.unwrap(),
            vec![4_000, 3_000]
        );
    }
}
