//! Operations on the `queue_lines` table.

use callsys_types::{LineId, QueueLine};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;

/// Operations on the `queue_lines` table.
pub struct LineStore<'a> {
    pool: &'a PgPool,
}

impl<'a> LineStore<'a> {
    /// Bind to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All lines, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn list(&self) -> Result<Vec<QueueLine>, DbError> {
        let rows = sqlx::query_as::<_, LineRow>(
            r"SELECT id, name, prefix, color, created_at
              FROM queue_lines
              ORDER BY created_at, id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(QueueLine::from).collect())
    }

    /// Insert a line.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails (including a
    /// duplicate prefix).
    pub async fn insert(&self, line: &QueueLine) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO queue_lines (id, name, prefix, color, created_at)
              VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(line.id.into_inner())
        .bind(&line.name)
        .bind(&line.prefix)
        .bind(&line.color)
        .bind(line.created_at)
        .execute(self.pool)
        .await?;
        tracing::debug!(line_id = %line.id, prefix = %line.prefix, "Inserted line");
        Ok(())
    }

    /// Delete a line; `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the delete fails.
    pub async fn delete(&self, id: LineId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM queue_lines WHERE id = $1")
            .bind(id.into_inner())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// A row from the `queue_lines` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LineRow {
    /// Line UUID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Subscriber-facing short code.
    pub prefix: String,
    /// Display color.
    pub color: String,
    /// Creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<LineRow> for QueueLine {
    fn from(row: LineRow) -> Self {
        Self {
            id: LineId::from(row.id),
            name: row.name,
            prefix: row.prefix,
            color: row.color,
            created_at: row.created_at,
        }
    }
}
