//! Error types for the callsys binary.
//!
//! [`AppError`] wraps every failure that can stop the service during
//! startup or while serving, so `main` can propagate with `?`.

/// Top-level error for the callsys binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: callsys_core::config::ConfigError,
    },

    /// A store could not be reached or migrated.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: callsys_db::DbError,
    },

    /// The queue system failed to assemble or start.
    #[error("queue error: {source}")]
    Queue {
        /// The underlying queue error.
        #[from]
        source: callsys_core::QueueError,
    },

    /// NATS connection or relay failed.
    #[error("NATS error: {source}")]
    Nats {
        /// The underlying broadcast error.
        #[from]
        source: callsys_core::broadcaster::BroadcastError,
    },

    /// The HTTP server failed.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: callsys_server::ServerError,
    },
}
