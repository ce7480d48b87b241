//! Patos API server

use anyhow::Context;
use patos_api::{routes::create_router, telemetry, AppState, Config};
use patos_shared::{create_pool, run_migrations};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init("info,patos_api=debug,tower_http=info");

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(
        project = %config.project_name,
        api_host = %config.api_host_url,
        secured = config.secured,
        "Starting Patos API"
    );

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database migrations applied");

    let bind_address = config.bind_address.clone();
    let state = AppState::postgres(config, pool).context("Invalid OAuth redirect URL")?;
    let app = create_router(state);

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
