//! Shared type definitions for the callsys queue service.
//!
//! This crate is the single source of truth for the records and events used
//! across the workspace. Types flow downstream to `TypeScript` via `ts-rs`
//! for the display and operator front ends.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for lines and appointments
//! - [`enums`] -- Roles, permissions, history actions, operational flags
//! - [`structs`] -- Queue state, appointments, history, sessions, content
//! - [`events`] -- Broadcast events and the connect-time snapshot

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AppointmentStatus, Audience, Direction, HistoryAction, Permission, Role, SystemMode};
pub use events::{BroadcastEvent, LineSnapshot, Snapshot};
pub use ids::{AppointmentId, LineId};
pub use structs::{
    AdminLogEntry, Appointment, DailyStats, FeaturedContent, HistoryRecord, QueueLine, QueueState,
    Session, Subscription,
};
