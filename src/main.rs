use std::net::SocketAddr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use csv_catalog_pipeline::api;
use csv_catalog_pipeline::api::handlers::AppState;
use csv_catalog_pipeline::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(
        "Target database {} with query output at {}",
        config.engine.database, config.engine.output_location
    );

    let shutdown = CancellationToken::new();
    let state = AppState::from_config(&config, shutdown.child_token()).map_err(|e| {
        error!("Failed to initialize pipeline: {}", e);
        e
    })?;

    let schedule = config.retention.sweep_interval_secs.map(|secs| {
        info!("Scheduling retention sweep every {} seconds", secs);
        state
            .sweeper
            .clone()
            .spawn_schedule(Duration::from_secs(secs), shutdown.child_token())
    });

    let app = api::routes::create_router_with_state(state);

    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            signal.cancel();
        })
        .await?;

    if let Some(schedule) = schedule {
        schedule.await?;
    }

    Ok(())
}
