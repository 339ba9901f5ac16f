//! Process host for the check-in event state service.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `checkin-config.yaml` (or `CHECKIN_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and run migrations
//! 4. Build the reconciler and scheduler, start the scheduler
//! 5. Serve the operator API
//!
//! # Shutdown
//!
//! On Ctrl-C or `SIGTERM` the scheduler is stopped first, then the HTTP
//! server drains, then the pool is closed.

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use checkin_api::{AppState, ServerConfig};
use checkin_core::{CheckinConfig, LogFormat, Reconciler, Scheduler, StartOutcome};
use checkin_db::{PgEventStore, PostgresConfig, PostgresPool};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ServerError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "checkin-config.yaml";

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 1. Load configuration.
    let config_path = std::env::var("CHECKIN_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = CheckinConfig::load_or_default(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config)?;
    info!(
        config = %config_path.display(),
        port = config.server.port,
        scheduler_enabled = config.scheduler.enabled,
        cadence_ms = config.scheduler.cadence_ms,
        "checkin-server starting"
    );

    // 3. Connect to PostgreSQL.
    let pool = PostgresPool::connect(&PostgresConfig::from(&config.database)).await?;
    if config.database.run_migrations {
        pool.run_migrations().await?;
    }

    // 4. Reconciler and scheduler.
    let store = PgEventStore::new(&pool);
    let reconciler = Arc::new(Reconciler::with_system_clock(store));
    let scheduler = Arc::new(Scheduler::new(
        reconciler,
        config.scheduler.to_scheduler_config(),
    ));

    if config.scheduler.enabled {
        match scheduler.start().await {
            StartOutcome::Started { next_run } => info!(%next_run, "Scheduler running"),
            StartOutcome::AlreadyRunning => warn!("Scheduler was already running"),
            StartOutcome::Error { message } => {
                error!(error = %message, "Scheduler failed to start, serving without it");
            }
        }
    } else {
        info!("Scheduler disabled by configuration");
    }

    // 5. Serve until a shutdown signal, stopping the scheduler first.
    let state = Arc::new(AppState::new(Arc::clone(&scheduler)));
    let server_config = ServerConfig::from(&config.server);
    let shutdown = {
        let scheduler = Arc::clone(&scheduler);
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            let _ = scheduler.stop().await;
        }
    };

    let served = checkin_api::start_server(&server_config, state, shutdown).await;

    // A bind failure skips the signal path; make sure the loop is gone.
    let _ = scheduler.stop().await;
    pool.close().await;
    served?;

    info!("checkin-server shutdown complete");
    Ok(())
}

fn init_tracing(config: &CheckinConfig) -> Result<(), ServerError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .map_err(|e| ServerError::Logging {
            message: format!("invalid log level {:?}: {e}", config.logging.level),
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| ServerError::Logging {
        message: e.to_string(),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                let _ = sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
