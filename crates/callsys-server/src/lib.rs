//! HTTP and `WebSocket` API for the callsys queue service.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) streaming queue events to displays
//!   and operator consoles, with a bootstrap snapshot on connect
//! - **Public REST endpoints** for the line list, passed numbers,
//!   featured links and self-service ticket intake
//! - **Operator REST endpoints** for counters, passed numbers,
//!   appointments, settings and reports, behind bearer-token sessions
//! - **Chat-bot endpoints** for subscription commands, behind a shared
//!   bot token
//!
//! All state lives in the [`QueueSystem`](callsys_core::QueueSystem); the
//! server holds no queue state of its own, so several instances can run
//! side by side.

pub mod bot;
pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
