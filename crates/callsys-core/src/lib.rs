//! Queue logic for the callsys queue service.
//!
//! This crate owns every state transition of the numbered lines and
//! everything that reacts to them: chat-bot notifications, the wait-time
//! estimate, the event fan-out to displays and the scheduled rollover.
//! [`QueueSystem`] assembles the pieces for the HTTP layer.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `callsys-config.yaml`.
//! - [`controller`] -- Counter, passed-list, appointment and reset
//!   operations returning the events to broadcast.
//! - [`dispatcher`] -- Proximity and arrival notifications.
//! - [`notifier`] -- LINE push transport and test recorder.
//! - [`templates`] -- Message templates.
//! - [`estimator`] -- Cached wait-time estimate.
//! - [`broadcaster`] -- Local and NATS event fan-out.
//! - [`lines`] -- Line registry.
//! - [`settings`] -- System flags and featured content.
//! - [`auth`] -- Sessions and the permission gate.
//! - [`subscriptions`] -- Chat-bot subscription commands.
//! - [`reporting`] -- History and daily statistics.
//! - [`scheduler`] -- Daily reset and expiry sweep tasks.
//! - [`system`] -- The assembled [`QueueSystem`].
//! - [`clock`], [`validate`], [`error`] -- Shared helpers.
//!
//! [`QueueSystem`]: system::QueueSystem

pub mod auth;
pub mod broadcaster;
pub mod clock;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod estimator;
pub mod lines;
pub mod notifier;
pub mod reporting;
pub mod scheduler;
pub mod settings;
pub mod subscriptions;
pub mod system;
pub mod templates;
pub mod validate;

pub use config::CallsysConfig;
pub use error::QueueError;
pub use system::{Backends, QueueSystem};
