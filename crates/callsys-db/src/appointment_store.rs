//! Operations on the `appointments` table.
//!
//! Due appointments are claimed with `FOR UPDATE SKIP LOCKED` inside a
//! transaction so two server instances calling the same line at the same
//! moment never consume the same appointment.

use callsys_types::{Appointment, AppointmentId, AppointmentStatus, LineId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;

/// Operations on the `appointments` table.
pub struct AppointmentStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AppointmentStore<'a> {
    /// Bind to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending appointment.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert(&self, appointment: &Appointment) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO appointments (id, line_id, number, scheduled_at, status, created_at)
              VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(appointment.id.into_inner())
        .bind(appointment.line_id.into_inner())
        .bind(to_db_number(appointment.number))
        .bind(appointment.scheduled_at)
        .bind(appointment.status.as_str())
        .bind(appointment.created_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Delete an appointment; `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the delete fails.
    pub async fn delete(&self, id: AppointmentId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id.into_inner())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Appointments ordered by scheduled time, optionally for one line.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row cannot be decoded.
    pub async fn list(&self, line_id: Option<LineId>) -> Result<Vec<Appointment>, DbError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            r"SELECT id, line_id, number, scheduled_at, status, created_at
              FROM appointments
              WHERE ($1::UUID IS NULL OR line_id = $1)
              ORDER BY scheduled_at, number",
        )
        .bind(line_id.map(LineId::into_inner))
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(Appointment::try_from).collect()
    }

    /// Claim the earliest due pending appointment whose number is still
    /// ahead of `current`.
    ///
    /// Due appointments with a number `<= current` are stale and are marked
    /// cancelled on the way. The claimed appointment is marked called.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the transaction fails or a row cannot be
    /// decoded.
    pub async fn claim_due(
        &self,
        line_id: LineId,
        now: DateTime<Utc>,
        current: u64,
    ) -> Result<Option<Appointment>, DbError> {
        let mut tx = self.pool.begin().await?;
        loop {
            let row = sqlx::query_as::<_, AppointmentRow>(
                r"SELECT id, line_id, number, scheduled_at, status, created_at
                  FROM appointments
                  WHERE line_id = $1 AND status = 'pending' AND scheduled_at <= $2
                  ORDER BY scheduled_at, number
                  LIMIT 1
                  FOR UPDATE SKIP LOCKED",
            )
            .bind(line_id.into_inner())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                tx.commit().await?;
                return Ok(None);
            };
            let mut appointment = Appointment::try_from(row)?;
            let status = if appointment.number > current {
                AppointmentStatus::Called
            } else {
                AppointmentStatus::Cancelled
            };

            sqlx::query("UPDATE appointments SET status = $2 WHERE id = $1")
                .bind(appointment.id.into_inner())
                .bind(status.as_str())
                .execute(&mut *tx)
                .await?;

            if status == AppointmentStatus::Called {
                tx.commit().await?;
                appointment.status = status;
                return Ok(Some(appointment));
            }
            tracing::info!(
                line_id = %line_id,
                number = appointment.number,
                current,
                "Cancelled stale appointment"
            );
        }
    }

    /// Return a called appointment to pending; `true` if it was called.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn release(&self, id: AppointmentId) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"UPDATE appointments SET status = 'pending'
              WHERE id = $1 AND status = 'called'",
        )
        .bind(id.into_inner())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel every pending appointment of a line; returns how many.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn cancel_pending(&self, line_id: LineId) -> Result<u64, DbError> {
        let result = sqlx::query(
            r"UPDATE appointments SET status = 'cancelled'
              WHERE line_id = $1 AND status = 'pending'",
        )
        .bind(line_id.into_inner())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn to_db_number(number: u64) -> i64 {
    i64::try_from(number).unwrap_or(i64::MAX)
}

/// A row from the `appointments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    /// Appointment UUID.
    pub id: Uuid,
    /// Line UUID.
    pub line_id: Uuid,
    /// Reserved number.
    pub number: i64,
    /// Scheduled time.
    pub scheduled_at: DateTime<Utc>,
    /// Status name.
    pub status: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DbError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let status = AppointmentStatus::parse(&row.status).ok_or_else(|| DbError::Corrupt {
            key: format!("appointments.{}", row.id),
            reason: format!("unknown status {}", row.status),
        })?;
        let number = u64::try_from(row.number).map_err(|e| DbError::Corrupt {
            key: format!("appointments.{}", row.id),
            reason: e.to_string(),
        })?;
        Ok(Self {
            id: AppointmentId::from(row.id),
            line_id: LineId::from(row.line_id),
            number,
            scheduled_at: row.scheduled_at,
            status,
            created_at: row.created_at,
        })
    }
}
