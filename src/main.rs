// Main entry point - Dependency injection, acquisition and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::application::machine_service::MachineService;
use crate::application::monitor_service::MonitorService;
use crate::application::reading_log::ReadingLog;
use crate::application::supervisor::ConnectionSupervisor;
use crate::application::telemetry_store::TelemetryStore;
use crate::infrastructure::config::{load_monitor_config, MachineConfig};
use crate::infrastructure::memory_log::InMemoryReadingLog;
use crate::infrastructure::modbus_source::ModbusRegisterSource;
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_monitor_config()?;

    // Shared state and reading log (application + infrastructure layers)
    let store = TelemetryStore::new(config.machines.iter().map(MachineConfig::profile));
    let log: Arc<dyn ReadingLog> = Arc::new(InMemoryReadingLog::new(config.log.retention_per_machine));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One supervisor per machine, each the only writer of its entry
    let mut supervisors = Vec::with_capacity(config.machines.len());
    for machine in &config.machines {
        let profile = machine.profile();
        let writer = store.claim_writer(profile.id)?;
        let source = ModbusRegisterSource::new(
            machine.address.clone(),
            machine.port,
            config.acquisition.unit_id,
            config.acquisition.io_timeout(),
        );
        let supervisor = ConnectionSupervisor::new(
            profile,
            source,
            writer,
            log.clone(),
            config.acquisition.timing(),
        );
        supervisors.push(tokio::spawn(supervisor.run(shutdown_rx.clone())));
    }

    // Create services (application layer)
    let machine_service = MachineService::new(
        store.clone(),
        log.clone(),
        config.monitor.evaluator(),
        config.monitor.alarm_backlog_rows,
    );
    let monitor_service = MonitorService::new(
        store.clone(),
        log.clone(),
        config.monitor.limits(),
        config.monitor.refresh_interval(),
        config.monitor.backlog_rows,
        shutdown_rx,
    );

    let state = Arc::new(AppState {
        machine_service,
        monitor_service,
    });

    // Build router (presentation layer)
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server.listen.parse()?;
    tracing::info!(
        "Starting line-monitor on {} with {} machines",
        addr,
        config.machines.len()
    );

    // Supervisors and open monitor sessions stop on the same signal
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for result in futures::future::join_all(supervisors).await {
        if let Err(e) = result {
            tracing::warn!("Supervisor task failed: {}", e);
        }
    }

    Ok(())
}
