//! Player binary: runs one or more emulated peers against a coordinator.
//!
//! The first argument is the launch URL. Its `emulate` query parameter sets
//! how many peers run side by side; they share one unlock, triggered by
//! pressing Enter.
//!
//! # Environment Variables
//!
//! - `ASSETS_DIR`: directory audio files are read from (default: "public")
//! - `RUST_LOG`: Tracing filter (default: "info,ensemble=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin player -- "http://127.0.0.1:8000/?emulate=3"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use ensemble::config::emulated_peers;
use ensemble::runtime::peer::DEFAULT_ASSETS_DIR;
use ensemble::runtime::{launch_peers, NegotiatedConfig, PeerOptions};
use ensemble::signal::spawn_line_feed;
use ensemble::{LifecycleOrchestrator, SignalSource};

const DEFAULT_URL: &str = "http://127.0.0.1:8000/";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ensemble=debug".into()),
        )
        .init();

    let raw = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    let url = reqwest::Url::parse(&raw).with_context(|| format!("invalid launch URL '{raw}'"))?;
    let count = emulated_peers(&url);

    let negotiate_url = url.join("negotiate/player")?;
    let negotiated: NegotiatedConfig = reqwest::get(negotiate_url.clone())
        .await
        .with_context(|| format!("failed to reach {negotiate_url}"))?
        .error_for_status()?
        .json()
        .await
        .context("invalid negotiation response")?;
    tracing::info!(
        "Negotiated '{}' with {} ({})",
        negotiated.client_type,
        negotiated.app.name,
        negotiated.env.env_type
    );

    let assets_dir = std::env::var("ASSETS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_ASSETS_DIR));
    let launch = launch_peers(
        count,
        |_| PeerOptions {
            assets_dir: assets_dir.clone(),
            ..PeerOptions::default()
        },
        Arc::new(negotiated),
        LifecycleOrchestrator::default(),
    )?;

    let keyboard = Arc::new(SignalSource::new("keyboard"));
    launch.bind(&[keyboard.clone()]);
    tracing::info!("Press Enter to start audio for {} peer(s)", count);

    spawn_line_feed(std::io::BufReader::new(std::io::stdin()), keyboard);

    let mut started = 0;
    for (index, result) in launch.join().await.into_iter().enumerate() {
        match result {
            Ok(experience) => {
                started += 1;
                tracing::info!("Peer {} running: {}", index, experience.status());
            }
            Err(e) => tracing::error!("Peer {} failed: {}", index, e),
        }
    }
    tracing::info!("{}/{} peer(s) started; press Ctrl-C to exit", started, count);

    tokio::signal::ctrl_c().await?;
    Ok(())
}
