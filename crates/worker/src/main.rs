//! Patos background worker
//!
//! Deletes expired organization invites and password resets on a fixed
//! schedule until Ctrl-C.

mod config;
mod scheduler;
mod sweeps;

use std::sync::Arc;

use anyhow::Context;
use patos_api::{
    store::{PgOrganizationStore, PgPasswordResetStore},
    telemetry,
};
use patos_shared::create_pool;
use tokio::sync::watch;

use crate::{
    config::WorkerConfig,
    scheduler::Scheduler,
    sweeps::{InviteSweep, PasswordResetSweep},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init("info,patos_worker=debug");

    let config = WorkerConfig::from_env().context("Invalid configuration")?;
    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut scheduler = Scheduler::new(config.sweep_backoff, shutdown_rx);

    scheduler.register(
        Arc::new(InviteSweep::new(Arc::new(PgOrganizationStore::new(pool.clone())))),
        config.sweep_interval,
        config.sweep_workers,
    );
    scheduler.register(
        Arc::new(PasswordResetSweep::new(Arc::new(PgPasswordResetStore::new(
            pool,
            config.password_reset_ttl,
        )))),
        config.sweep_interval,
        config.sweep_workers,
    );
    tracing::info!(loops = scheduler.task_count(), "Worker started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    shutdown_tx.send(true).context("All task loops already stopped")?;
    scheduler.join().await;

    tracing::info!("Worker stopped");
    Ok(())
}
