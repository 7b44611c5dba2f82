//! Coordinator HTTP server binary.
//!
//! Loads the application configuration, initializes the coordinator's
//! plugins and serves per-connection negotiation over HTTP.
//!
//! # Environment Variables
//!
//! - `ENV`: configuration profile under `config/env/` (default: "default")
//! - `CONFIG_DIR`: configuration root (default: "config")
//! - `RUST_LOG`: Tracing filter (default: "info,ensemble=debug")
//!
//! # Usage
//!
//! ```bash
//! ENV=default cargo run --bin server
//! ```

use std::net::SocketAddr;

use ensemble::config;
use ensemble::runtime::{default_negotiation, Coordinator};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ensemble=debug".into()),
        )
        .init();

    let profile = config::profile_from_env();
    let dir = config::config_dir_from_env();
    let app_config = match config::load(&dir, &profile) {
        Ok(app_config) => app_config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let bind_addr = SocketAddr::from(([0, 0, 0, 0], app_config.env.port));
    tracing::info!(
        "{} ({}) starting, profile '{}', version {}",
        app_config.app.name,
        app_config.env.env_type,
        profile,
        ensemble::VERSION
    );

    let started = match Coordinator::new(app_config) {
        Ok(coordinator) => coordinator.init(default_negotiation()).await,
        Err(e) => Err(e),
    };

    let app = match started {
        Ok(started) => started.start(),
        Err(e) => {
            tracing::error!("Coordinator failed to start: {}", e);
            tracing::warn!("Not serving; press Ctrl-C to exit");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET /health                liveness probe");
    tracing::info!("  GET /negotiate/:client_type client configuration");
    tracing::info!("  GET /state/:name           shared state values");

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        });
    if let Err(e) = serve.await {
        tracing::error!("Server failed: {}", e);
    }
}
