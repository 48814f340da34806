//! tallyd - collaborative estimation session daemon
//!
//! Long-running server hosting ephemeral estimation rooms. Rooms live in
//! memory only; restarting the daemon drops them all.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_net::{Server, DEFAULT_PORT};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let port = match std::env::var("TALLYD_PORT") {
        Ok(raw) => match raw.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                tracing::error!(value = %raw, "TALLYD_PORT is not a valid port number");
                std::process::exit(1);
            }
        },
        Err(_) => DEFAULT_PORT,
    };

    tracing::info!(port, "Starting tallyd");

    let server = match Server::start(port).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start server");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    server.shutdown();
    tracing::info!("tallyd stopped");
}
