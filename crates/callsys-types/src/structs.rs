//! Core record structs for the callsys queue service.
//!
//! These are the typed records that cross crate boundaries. They are
//! serialized to JSON only at the store boundary and on the wire.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{AppointmentStatus, HistoryAction, Role};
use crate::ids::{AppointmentId, LineId};

// ---------------------------------------------------------------------------
// Lines and queue state
// ---------------------------------------------------------------------------

/// One independently numbered service line (a counter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct QueueLine {
    /// Line identifier.
    pub id: LineId,
    /// Display name shown on screens and in chat replies.
    pub name: String,
    /// Short code subscribers use to name the line (e.g. `A`).
    pub prefix: String,
    /// Cosmetic display color (CSS color string).
    pub color: String,
    /// When the line was created.
    pub created_at: DateTime<Utc>,
}

/// Current and issued numbers of one line.
///
/// Construction clamps `issued` up to `current`, so a value of this type
/// always satisfies `issued >= current`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct QueueState {
    /// Last number called.
    #[ts(type = "number")]
    pub current: u64,
    /// Highest number handed out.
    #[ts(type = "number")]
    pub issued: u64,
}

impl QueueState {
    /// Build a state from raw store values, clamping `issued` to `current`.
    pub fn new(current: u64, issued: u64) -> Self {
        Self {
            current,
            issued: issued.max(current),
        }
    }

    /// Number of tickets handed out but not yet called.
    pub const fn waiting(&self) -> u64 {
        self.issued.saturating_sub(self.current)
    }
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

/// A pre-scheduled number that pre-empts sequential calling once due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Appointment {
    /// Appointment identifier.
    pub id: AppointmentId,
    /// Line the appointment belongs to.
    pub line_id: LineId,
    /// Reserved number.
    #[ts(type = "number")]
    pub number: u64,
    /// When the number should be called.
    pub scheduled_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: AppointmentStatus,
    /// When the appointment was created.
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// Whether this appointment should pre-empt a call made at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == AppointmentStatus::Pending && self.scheduled_at <= now
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Immutable audit line describing one state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct HistoryRecord {
    /// Line the transition happened on.
    pub line_id: LineId,
    /// Local calendar date (`YYYY-MM-DD`) used for daily reporting.
    pub date_str: String,
    /// Wall-clock time of the transition in Unix milliseconds.
    #[ts(type = "number")]
    pub timestamp_ms: i64,
    /// Number acted upon.
    #[ts(type = "number")]
    pub number: u64,
    /// What happened.
    pub action: HistoryAction,
    /// Nickname of the operator (or `public` for self-service intake).
    pub operator: String,
    /// Wait estimate in minutes at the time of the transition.
    #[ts(as = "String")]
    pub wait_estimate_min: Decimal,
}

/// Call counts of one local day, bucketed by hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DailyStats {
    /// Local calendar date (`YYYY-MM-DD`).
    pub date: String,
    /// Total call records for the day.
    pub total: u32,
    /// Call records per local hour, index 0 through 23.
    pub hourly: Vec<u32>,
}

// ---------------------------------------------------------------------------
// Subscriptions and sessions
// ---------------------------------------------------------------------------

/// A chat-bot subscriber waiting for one number on one line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Subscription {
    /// External identity of the subscriber (chat-bot user id).
    pub subscriber_id: String,
    /// Line being tracked.
    pub line_id: LineId,
    /// Target number.
    #[ts(type = "number")]
    pub number: u64,
}

/// An authenticated operator session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    /// Login name.
    pub username: String,
    /// Role granted at login.
    pub role: Role,
    /// Display name recorded in history.
    pub nickname: String,
}

// ---------------------------------------------------------------------------
// Content and logs
// ---------------------------------------------------------------------------

/// A link shown on the public display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct FeaturedContent {
    /// Link caption.
    pub link_text: String,
    /// Link target.
    pub link_url: String,
}

/// One operator-log line pushed to privileged clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AdminLogEntry {
    /// When the entry was written.
    pub at: DateTime<Utc>,
    /// Who performed the action.
    pub operator: String,
    /// Human-readable description.
    pub message: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn queue_state_clamps_issued_on_construction() {
        let state = QueueState::new(7, 3);
        assert_eq!(state.current, 7);
        assert_eq!(state.issued, 7);
        assert_eq!(state.waiting(), 0);
    }

    #[test]
    fn waiting_counts_uncalled_tickets() {
        assert_eq!(QueueState::new(4, 10).waiting(), 6);
    }

    #[test]
    fn appointment_due_only_when_pending_and_elapsed() {
        let now = Utc::now();
        let mut appt = Appointment {
            id: AppointmentId::new(),
            line_id: LineId::new(),
            number: 8,
            scheduled_at: now - Duration::minutes(1),
            status: AppointmentStatus::Pending,
            created_at: now,
        };
        assert!(appt.is_due(now));

        appt.scheduled_at = now + Duration::minutes(1);
        assert!(!appt.is_due(now));

        appt.scheduled_at = now - Duration::minutes(1);
        appt.status = AppointmentStatus::Called;
        assert!(!appt.is_due(now));
    }

    #[test]
    fn featured_content_uses_camel_case_on_the_wire() {
        let item = FeaturedContent {
            link_text: "Menu".to_owned(),
            link_url: "https://example.com".to_owned(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["linkText"], "Menu");
        assert_eq!(json["linkUrl"], "https://example.com");
    }
}
