//! Enumeration types for the callsys queue service.
//!
//! Roles and permission tags for the operator API, the actions recorded in
//! the history log, appointment lifecycle states, and the operational flags
//! that change how tickets are dispensed.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Roles and permissions
// ---------------------------------------------------------------------------

/// Role attached to an operator session.
///
/// Roles are totally ordered: `Viewer < Operator < Manager < Admin`. A role
/// satisfies every permission whose minimum role is at or below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Role {
    /// Read-only access to the operator dashboard and its log channel.
    Viewer,
    /// Counter staff: calls, issues, passes and recalls numbers.
    Operator,
    /// Supervisor: appointments and system settings.
    Manager,
    /// Full control, including line management.
    Admin,
}

impl Role {
    /// Whether this role may perform actions tagged with `permission`.
    ///
    /// `Admin` implicitly satisfies every tag.
    pub fn satisfies(self, permission: Permission) -> bool {
        self == Self::Admin || self >= permission.minimum_role()
    }

    /// Stable lowercase name used in storage and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Operator => "operator",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }
}

/// Permission tag required by an operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Permission {
    /// Move the current number (next, previous, direct set).
    Call,
    /// Move the issued number (next, previous, direct set).
    Issue,
    /// Mark the current number as passed.
    Pass,
    /// Recall or edit the passed list.
    Recall,
    /// Create, remove and list appointments.
    Appointment,
    /// Reset, system flags, featured content, broadcast messages.
    Settings,
}

impl Permission {
    /// Lowest role that holds this permission.
    pub const fn minimum_role(self) -> Role {
        match self {
            Self::Call | Self::Issue | Self::Pass | Self::Recall => Role::Operator,
            Self::Appointment | Self::Settings => Role::Manager,
        }
    }
}

// ---------------------------------------------------------------------------
// History actions
// ---------------------------------------------------------------------------

/// The state transition a [`HistoryRecord`](crate::HistoryRecord) describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum HistoryAction {
    /// Sequential call of the next issued number.
    Call,
    /// Rollback of the current number by one.
    CallPrev,
    /// Call pre-empted by a due appointment.
    AppointmentCall,
    /// The current number was skipped and moved to the passed list.
    Pass,
    /// A passed number was re-served.
    Recall,
    /// Operator dispensed the next ticket.
    Issue,
    /// Operator withdrew the last dispensed ticket.
    IssuePrev,
    /// Self-service ticket taken through the public intake.
    OnlineTake,
    /// Operator override of the current number.
    SetCall,
    /// Operator override of the issued number.
    SetIssue,
    /// Full reset of the line.
    Reset,
}

impl HistoryAction {
    /// Stable database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::CallPrev => "call_prev",
            Self::AppointmentCall => "appointment_call",
            Self::Pass => "pass",
            Self::Recall => "recall",
            Self::Issue => "issue",
            Self::IssuePrev => "issue_prev",
            Self::OnlineTake => "online_take",
            Self::SetCall => "set_call",
            Self::SetIssue => "set_issue",
            Self::Reset => "reset",
        }
    }

    /// Parse the database representation back into an action.
    pub fn parse(value: &str) -> Option<Self> {
        let action = match value {
            "call" => Self::Call,
            "call_prev" => Self::CallPrev,
            "appointment_call" => Self::AppointmentCall,
            "pass" => Self::Pass,
            "recall" => Self::Recall,
            "issue" => Self::Issue,
            "issue_prev" => Self::IssuePrev,
            "online_take" => Self::OnlineTake,
            "set_call" => Self::SetCall,
            "set_issue" => Self::SetIssue,
            "reset" => Self::Reset,
            _ => return None,
        };
        Some(action)
    }

    /// Whether records with this action feed the wait-time estimate.
    pub const fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::AppointmentCall)
    }
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

/// Lifecycle of an [`Appointment`](crate::Appointment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum AppointmentStatus {
    /// Waiting for its scheduled time.
    Pending,
    /// Consumed by a call-next operation.
    Called,
    /// Withdrawn by a reset or found stale at consumption time.
    Cancelled,
}

impl AppointmentStatus {
    /// Stable database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Called => "called",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the database representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "called" => Some(Self::Called),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Operational flags
// ---------------------------------------------------------------------------

/// How tickets are handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SystemMode {
    /// Self-service dispensing is enabled.
    #[default]
    Ticketing,
    /// Manual-input-only: numbers are set by operators, dispensing is off.
    Input,
}

impl SystemMode {
    /// Stable storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticketing => "ticketing",
            Self::Input => "input",
        }
    }

    /// Parse the storage representation, defaulting unknown values to
    /// [`SystemMode::Ticketing`].
    pub fn parse_or_default(value: &str) -> Self {
        if value == "input" { Self::Input } else { Self::Ticketing }
    }
}

/// Direction argument of the call/issue commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Direction {
    /// Advance by one.
    Next,
    /// Roll back by one.
    Prev,
}

/// Which broadcast channel an event is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Every connected client.
    Public,
    /// Authenticated operator clients only.
    Privileged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_satisfies_every_permission() {
        for p in [
            Permission::Call,
            Permission::Issue,
            Permission::Pass,
            Permission::Recall,
            Permission::Appointment,
            Permission::Settings,
        ] {
            assert!(Role::Admin.satisfies(p));
        }
    }

    #[test]
    fn role_ordering_gates_permissions() {
        assert!(!Role::Viewer.satisfies(Permission::Call));
        assert!(Role::Operator.satisfies(Permission::Call));
        assert!(!Role::Operator.satisfies(Permission::Settings));
        assert!(Role::Manager.satisfies(Permission::Settings));
        assert!(Role::Manager.satisfies(Permission::Recall));
    }

    #[test]
    fn history_action_round_trips_through_db_name() {
        for action in [
            HistoryAction::Call,
            HistoryAction::CallPrev,
            HistoryAction::AppointmentCall,
            HistoryAction::OnlineTake,
            HistoryAction::Reset,
        ] {
            assert_eq!(HistoryAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(HistoryAction::parse("teleport"), None);
    }

    #[test]
    fn only_calls_feed_the_estimate() {
        assert!(HistoryAction::Call.is_call());
        assert!(HistoryAction::AppointmentCall.is_call());
        assert!(!HistoryAction::Pass.is_call());
        assert!(!HistoryAction::SetCall.is_call());
    }

    #[test]
    fn system_mode_parses_unknown_as_ticketing() {
        assert_eq!(SystemMode::parse_or_default("input"), SystemMode::Input);
        assert_eq!(SystemMode::parse_or_default("garbage"), SystemMode::Ticketing);
    }
}
