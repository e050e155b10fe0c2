//! callsys queue service binary.
//!
//! Wires the stores, the queue system, the background tasks and the API
//! server together, then serves until the process is stopped.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `callsys-config.yaml`
//! 3. Connect `Dragonfly` and `PostgreSQL`, or fall back to in-process stores
//! 4. Connect NATS for cross-instance fan-out when configured
//! 5. Assemble the queue system and create the default line
//! 6. Spawn the daily reset and the expiry sweep
//! 7. Serve the HTTP and `WebSocket` API

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use callsys_core::broadcaster::Broadcaster;
use callsys_core::notifier::Notifier;
use callsys_core::scheduler;
use callsys_core::{Backends, CallsysConfig, QueueSystem};
use callsys_db::{DragonflyPool, PostgresPool, RecordStore, StateStore};
use callsys_server::{AppState, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "callsys-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step or the server fails.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("callsys starting");

    // 2. Load configuration.
    let config = load_config(&config_path())?;
    if config.users.is_empty() {
        warn!("no operator accounts configured; set CALLSYS_ADMIN_PASSWORD to create one");
    }
    info!(
        users = config.users.len(),
        port = config.infrastructure.port,
        utc_offset_minutes = config.clock.utc_offset_minutes,
        "Configuration loaded"
    );

    // 3. Stores.
    let state = connect_state(&config).await?;
    let records = connect_records(&config).await?;
    info!(
        state = state.backend(),
        records = records.backend(),
        "Stores ready"
    );

    // 4. Event fan-out.
    let broadcaster = match config.infrastructure.nats_url.as_deref() {
        Some(url) => {
            info!(nats_url = url, "Connecting to NATS");
            Broadcaster::connect_nats(url).await?
        }
        None => Broadcaster::local(),
    };
    let _relay = broadcaster.spawn_relay().await?;

    // 5. Queue system.
    let notifier = Notifier::from_config(&config.notifications);
    info!(notifier = notifier.name(), "Notifier selected");
    let server_config = ServerConfig {
        host: config.infrastructure.host.clone(),
        port: config.infrastructure.port,
    };
    let system = Arc::new(QueueSystem::new(
        config,
        Backends {
            state,
            records,
            notifier,
            broadcaster,
        },
    )?);
    system.start().await?;

    // 6. Background tasks.
    let _reset = scheduler::spawn_daily_reset(Arc::clone(&system));
    let _sweeper = scheduler::spawn_sweeper(Arc::clone(&system));

    // 7. Serve.
    callsys_server::start_server(&server_config, AppState::new(system)).await?;

    info!("callsys stopped");
    Ok(())
}

/// Config path from `CALLSYS_CONFIG`, the first argument, or the default.
fn config_path() -> PathBuf {
    std::env::var("CALLSYS_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load configuration, falling back to defaults plus environment
/// overrides when the file is missing.
fn load_config(path: &Path) -> Result<CallsysConfig, AppError> {
    if path.exists() {
        Ok(CallsysConfig::from_file(path)?)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(CallsysConfig::parse("")?)
    }
}

async fn connect_state(config: &CallsysConfig) -> Result<StateStore, AppError> {
    match config.infrastructure.dragonfly_url.as_deref() {
        Some(url) => {
            info!("Connecting to Dragonfly");
            Ok(StateStore::Dragonfly(DragonflyPool::connect(url).await?))
        }
        None => {
            warn!("DRAGONFLY_URL not set, queue state is in-process and single-instance");
            Ok(StateStore::in_memory())
        }
    }
}

async fn connect_records(config: &CallsysConfig) -> Result<RecordStore, AppError> {
    match config.infrastructure.postgres_url.as_deref() {
        Some(url) => {
            info!("Connecting to PostgreSQL");
            let pool = PostgresPool::connect_url(url).await?;
            pool.run_migrations().await?;
            info!("Migrations applied");
            Ok(RecordStore::Postgres(pool))
        }
        None => {
            warn!("DATABASE_URL not set, history and appointments are not persisted");
            Ok(RecordStore::in_memory())
        }
    }
}
