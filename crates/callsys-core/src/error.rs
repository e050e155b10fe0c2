//! Error taxonomy of the queue core.
//!
//! Validation and permission failures are raised before any state is
//! touched. Store failures surface as [`QueueError::StoreUnavailable`] and
//! the system fails closed.

use callsys_db::DbError;
use callsys_types::Permission;

/// Errors returned by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Malformed or out-of-range input; nothing was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No issued ticket is waiting to be called.
    #[error("no waiting tickets (current {current}, issued {issued})")]
    Exhausted {
        /// Current number at the time of the attempt.
        current: u64,
        /// Issued number at the time of the attempt.
        issued: u64,
    },

    /// The issued number would fall below the current number.
    #[error("issued number {requested} would fall below current {current}")]
    BelowCurrent {
        /// Issued number that was asked for.
        requested: u64,
        /// Current number at the time of the attempt.
        current: u64,
    },

    /// The subscription target has already been called.
    #[error("number {target} has already been reached (current {current})")]
    AlreadyPassed {
        /// Number the subscriber asked for.
        target: u64,
        /// Current number of the line.
        current: u64,
    },

    /// Missing, expired or wrong credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but the role does not grant the permission.
    #[error("forbidden: requires {0:?} permission")]
    Forbidden(Permission),

    /// Unknown line, appointment or passed number.
    #[error("not found: {0}")]
    NotFound(String),

    /// Tickets are only entered manually in the current mode.
    #[error("ticket issuance is manual-input only")]
    ManualInputOnly,

    /// Issuance is restricted to business hours.
    #[error("outside business hours")]
    OutsideBusinessHours,

    /// The system is closed to the public.
    #[error("the system is closed")]
    Closed,

    /// The caller exceeded the intake rate limit.
    #[error("too many requests")]
    RateLimited,

    /// A message template failed to render.
    #[error("message template failed: {0}")]
    Template(String),

    /// The backing store failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<DbError> for QueueError {
    fn from(err: DbError) -> Self {
        tracing::error!(error = %err, "store operation failed");
        Self::StoreUnavailable(err.to_string())
    }
}
