//! Events pushed to display and operator clients over the `WebSocket`.
//!
//! Every mutating operation produces a list of [`BroadcastEvent`]s. Each
//! event knows its [`Audience`]: public events go to every client, the
//! operator log goes to privileged clients only.
//!
//! On the wire an event is `{"event": "<name>", "data": {...}}`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{Audience, SystemMode};
use crate::ids::LineId;
use crate::structs::{AdminLogEntry, FeaturedContent, QueueLine, QueueState};

/// A state-change notification for connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "event", content = "data")]
#[ts(export, export_to = "bindings/")]
pub enum BroadcastEvent {
    /// Initial state sent once when a client connects.
    #[serde(rename = "bootstrap")]
    Bootstrap(Box<Snapshot>),

    /// Current or issued number of a line changed.
    #[serde(rename = "updateQueue")]
    QueueUpdated {
        /// Line that changed.
        line_id: LineId,
        /// Last number called.
        #[ts(type = "number")]
        current: u64,
        /// Highest number handed out.
        #[ts(type = "number")]
        issued: u64,
        /// Tickets handed out but not yet called.
        #[ts(type = "number")]
        waiting: u64,
    },

    /// Passed list of a line changed.
    #[serde(rename = "updatePassed")]
    PassedUpdated {
        /// Line that changed.
        line_id: LineId,
        /// Passed numbers in ascending order.
        #[ts(type = "Array<number>")]
        numbers: Vec<u64>,
    },

    /// Wait-time estimate of a line changed.
    #[serde(rename = "updateWaitTime")]
    WaitTimeUpdated {
        /// Line the estimate belongs to.
        line_id: LineId,
        /// Average minutes between calls; `0` means unknown.
        #[ts(as = "String")]
        minutes: Decimal,
    },

    /// Featured links changed.
    #[serde(rename = "updateFeaturedContents")]
    FeaturedUpdated {
        /// Current featured links.
        items: Vec<FeaturedContent>,
    },

    /// Display sound toggled.
    #[serde(rename = "updateSoundSetting")]
    SoundSetting {
        /// Whether displays should play call sounds.
        enabled: bool,
    },

    /// System opened to or closed for the public.
    #[serde(rename = "updatePublicStatus")]
    PublicStatus {
        /// Whether the public display is open.
        is_public: bool,
    },

    /// Dispensing mode changed.
    #[serde(rename = "updateSystemMode")]
    SystemModeChanged {
        /// New mode.
        mode: SystemMode,
    },

    /// Free-text announcement for displays.
    #[serde(rename = "adminBroadcast")]
    Announcement {
        /// Message to show and read aloud.
        message: String,
    },

    /// Set of lines changed (created or deleted).
    #[serde(rename = "updateQueues")]
    LinesUpdated {
        /// All lines.
        lines: Vec<QueueLine>,
    },

    /// Time of the most recent state change.
    #[serde(rename = "updateTimestamp")]
    Timestamp {
        /// When the change happened.
        at: DateTime<Utc>,
    },

    /// Operator log entry (privileged channel only).
    #[serde(rename = "newAdminLog")]
    AdminLog(AdminLogEntry),
}

impl BroadcastEvent {
    /// Channel this event is delivered on.
    pub const fn audience(&self) -> Audience {
        match self {
            Self::AdminLog(_) => Audience::Privileged,
            _ => Audience::Public,
        }
    }

    /// Convenience constructor for a queue update from a [`QueueState`].
    pub const fn queue(line_id: LineId, state: QueueState) -> Self {
        Self::QueueUpdated {
            line_id,
            current: state.current,
            issued: state.issued,
            waiting: state.waiting(),
        }
    }
}

/// Per-line part of the bootstrap [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LineSnapshot {
    /// The line.
    pub line: QueueLine,
    /// Its current and issued numbers.
    pub state: QueueState,
    /// Its passed numbers in ascending order.
    #[ts(type = "Array<number>")]
    pub passed: Vec<u64>,
    /// Its cached wait estimate in minutes.
    #[ts(as = "String")]
    pub wait_minutes: Decimal,
}

/// Full state sent to a client right after it connects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Snapshot {
    /// Every line with its state.
    pub lines: Vec<LineSnapshot>,
    /// Featured links.
    pub featured: Vec<FeaturedContent>,
    /// Whether the public display is open.
    pub is_public: bool,
    /// Whether displays should play sounds.
    pub sound_enabled: bool,
    /// Dispensing mode.
    pub mode: SystemMode,
    /// Recent operator log (privileged clients only, empty otherwise).
    pub admin_log: Vec<AdminLogEntry>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn admin_log_is_privileged_and_everything_else_public() {
        let log = BroadcastEvent::AdminLog(AdminLogEntry {
            at: Utc::now(),
            operator: "alice".to_owned(),
            message: "reset".to_owned(),
        });
        assert_eq!(log.audience(), Audience::Privileged);

        let update = BroadcastEvent::queue(LineId::new(), QueueState::new(1, 2));
        assert_eq!(update.audience(), Audience::Public);
    }

    #[test]
    fn queue_update_uses_client_event_name() {
        let line_id = LineId::new();
        let json = serde_json::to_value(BroadcastEvent::queue(line_id, QueueState::new(3, 8)))
            .unwrap();
        assert_eq!(json["event"], "updateQueue");
        assert_eq!(json["data"]["current"], 3);
        assert_eq!(json["data"]["issued"], 8);
        assert_eq!(json["data"]["waiting"], 5);
    }

    #[test]
    fn events_round_trip_through_json() {
        let event = BroadcastEvent::PassedUpdated {
            line_id: LineId::new(),
            numbers: vec![2, 5],
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: BroadcastEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
