//! Modelgate HTTP server
//!
//! Starts an Axum web server that routes chat-completion requests to the
//! cost-appropriate upstream model.

use clap::Parser;
use modelgate::{
    api::{self, AppState},
    cli::{Cli, Command, generate_config_template},
    config::Config,
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Wrote configuration template to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let config = Arc::new(Config::from_file(&cli.config)?);

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        upstream = %config.upstream.base_url,
        small = %config.models.small,
        medium = %config.models.medium,
        conversation_threshold = config.router.conversation_threshold,
        token_threshold = config.router.token_threshold,
        length_threshold = config.router.length_threshold,
        "Starting Modelgate server"
    );

    let state = AppState::new(config.clone())?;
    let app = api::router(state.clone());

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release the upstream connection pool before exiting
    state.service().close().await;
    tracing::info!("Modelgate shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown signal handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
