//! Arena Server - Main Entry Point
//!
//! Loads configuration, starts the WebSocket transport and runs the room
//! tick loop until a termination signal arrives.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use arena_core::AnonymousAuthorizer;
use arena_server::{
    config::{AppConfig, Args},
    demo, logging, shutdown, RoomServer, ServerConfig, WebSocketTransport,
};
use clap::Parser;
use tokio::runtime::Handle;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = Instant::now();

    let args = Args::parse();

    let mut app_config = AppConfig::load_from_file(&args.config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    app_config.apply_args(&args);
    app_config.validate()?;

    logging::setup_logging(&app_config.logging)?;

    info!("Starting Arena Server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config.display());

    let config = app_config.to_server_config();
    log_server_configuration(&config);

    let runtime = Handle::current();
    let transport = WebSocketTransport::new(runtime.clone());
    let mut server = RoomServer::new(
        config,
        Box::new(transport),
        demo::relay_factory(),
        Arc::new(AnonymousAuthorizer),
        runtime,
    );

    let shutdown_receiver = shutdown::setup_shutdown_handler();
    info!("Startup complete in {:.2?}", startup_start.elapsed());

    let run_start = Instant::now();
    if let Err(e) = server
        .run(async {
            let _ = shutdown_receiver.await;
        })
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }
    info!("Server stopped after {:.2?}", run_start.elapsed());

    Ok(())
}

/// Log the final server configuration
fn log_server_configuration(config: &ServerConfig) {
    info!("Server configuration:");
    info!("  Bind address: {}", config.bind_address);
    info!("  Tick rate: {} Hz", config.tick_rate_hz);
    info!("  Max catch-up ticks: {}", config.max_catch_up_ticks);
    info!("  Max connections: {}", config.max_connections);
    info!("  Connection timeout: {:?}", config.connection_timeout);
    info!(
        "  Default room size: {}..={}",
        config.default_min_players, config.default_max_players
    );
    info!("  Destroy empty rooms: {}", config.destroy_when_empty);
}
