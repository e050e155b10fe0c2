//! Append-only history of queue transitions.
//!
//! Every controller operation that changes state writes one row here. The
//! wait estimator reads the most recent call rows and reporting reads whole
//! days. Rows are never updated.

use callsys_types::{HistoryAction, HistoryRecord, LineId};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;

/// Operations on the `history` table.
pub struct HistoryStore<'a> {
    pool: &'a PgPool,
}

impl<'a> HistoryStore<'a> {
    /// Bind to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn append(&self, record: &HistoryRecord) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO history (line_id, date_str, timestamp_ms, number, action, operator, wait_estimate_min)
              VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.line_id.into_inner())
        .bind(&record.date_str)
        .bind(record.timestamp_ms)
        .bind(i64::try_from(record.number).unwrap_or(i64::MAX))
        .bind(record.action.as_str())
        .bind(&record.operator)
        .bind(record.wait_estimate_min)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Records whose local date lies in `from..=to` (`YYYY-MM-DD`), oldest
    /// first, optionally for one line.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails, or
    /// [`DbError::Corrupt`] if a row cannot be decoded.
    pub async fn by_date_range(
        &self,
        from: &str,
        to: &str,
        line_id: Option<LineId>,
    ) -> Result<Vec<HistoryRecord>, DbError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r"SELECT line_id, date_str, timestamp_ms, number, action, operator, wait_estimate_min
              FROM history
              WHERE date_str >= $1 AND date_str <= $2
                AND ($3::UUID IS NULL OR line_id = $3)
              ORDER BY timestamp_ms, id",
        )
        .bind(from)
        .bind(to)
        .bind(line_id.map(LineId::into_inner))
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(HistoryRecord::try_from).collect()
    }

    /// Timestamps of the `limit` most recent call records of a line,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn recent_call_times(&self, line_id: LineId, limit: usize) -> Result<Vec<i64>, DbError> {
        let times: Vec<i64> = sqlx::query_scalar(
            r"SELECT timestamp_ms
              FROM history
              WHERE line_id = $1 AND action IN ('call', 'appointment_call')
              ORDER BY timestamp_ms DESC
              LIMIT $2",
        )
        .bind(line_id.into_inner())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool)
        .await?;
        Ok(times)
    }
}

/// A row from the `history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRow {
    /// Line UUID.
    pub line_id: Uuid,
    /// Local date.
    pub date_str: String,
    /// Unix milliseconds.
    pub timestamp_ms: i64,
    /// Number acted on.
    pub number: i64,
    /// Action name.
    pub action: String,
    /// Operator nickname.
    pub operator: String,
    /// Estimate at the time, minutes.
    pub wait_estimate_min: Decimal,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let action = HistoryAction::parse(&row.action).ok_or_else(|| DbError::Corrupt {
            key: "history.action".to_owned(),
            reason: format!("unknown action {}", row.action),
        })?;
        let number = u64::try_from(row.number).map_err(|e| DbError::Corrupt {
            key: "history.number".to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            line_id: LineId::from(row.line_id),
            date_str: row.date_str,
            timestamp_ms: row.timestamp_ms,
            number,
            action,
            operator: row.operator,
            wait_estimate_min: row.wait_estimate_min,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(action: &str, number: i64) -> HistoryRow {
        HistoryRow {
            line_id: Uuid::now_v7(),
            date_str: "2026-03-01".to_owned(),
            timestamp_ms: 1,
            number,
            action: action.to_owned(),
            operator: "alice".to_owned(),
            wait_estimate_min: Decimal::ZERO,
        }
    }

    #[test]
    fn rows_decode_known_actions() {
        let record = HistoryRecord::try_from(row("appointment_call", 8));
        assert!(matches!(
            record,
            Ok(HistoryRecord {
                action: HistoryAction::AppointmentCall,
                number: 8,
                ..
            })
        ));
    }

    #[test]
    fn unknown_action_or_negative_number_is_corrupt() {
        assert!(matches!(
            HistoryRecord::try_from(row("teleport", 1)),
            Err(DbError::Corrupt { .. })
        ));
        assert!(matches!(
            HistoryRecord::try_from(row("call", -1)),
            Err(DbError::Corrupt { .. })
        ));
    }
}
