//! Data layer for the callsys queue service (`Dragonfly` + `PostgreSQL`).
//!
//! `Dragonfly` holds the hot, concurrently mutated queue state: counters,
//! passed lists, subscriptions, sessions and flags. Every conditional
//! update is a Lua script, so several server instances can share one
//! instance without in-process locks. `PostgreSQL` holds the durable
//! records: lines, the append-only history and appointments.
//!
//! # Architecture
//!
//! ```text
//! Controller
//!     |
//!     +-- StateStore ---> Dragonfly (DragonflyPool) | MemoryStore
//!     |
//!     +-- RecordStore --> PostgreSQL (PostgresPool) | MemoryRecords
//!         |-- LineStore         (queue_lines)
//!         |-- HistoryStore      (history, append-only)
//!         +-- AppointmentStore  (appointments)
//! ```
//!
//! # Modules
//!
//! - [`dragonfly`] -- `Dragonfly` queue state operations
//! - [`scripts`] -- Lua scripts behind the atomic operations
//! - [`keys`] -- Key layout
//! - [`memory`] -- In-process twin of the `Dragonfly` store
//! - [`store`] -- [`StateStore`] enum dispatch
//! - [`postgres`] -- `PostgreSQL` pool and configuration
//! - [`records`] -- [`RecordStore`] enum dispatch
//! - [`error`] -- Shared error type

pub mod appointment_store;
pub mod dragonfly;
pub mod error;
pub mod history_store;
pub mod keys;
pub mod line_store;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod scripts;
pub mod store;

pub use appointment_store::{AppointmentRow, AppointmentStore};
pub use dragonfly::DragonflyPool;
pub use error::DbError;
pub use history_store::{HistoryRow, HistoryStore};
pub use keys::Target;
pub use line_store::{LineRow, LineStore};
pub use memory::MemoryStore;
pub use postgres::PostgresPool;
pub use records::{MemoryRecords, RecordStore};
pub use store::{CounterUpdate, StateStore, SubscribeOutcome, setting};
