//! Runtime bootstraps for the two process roles.
//!
//! Both roles follow the same sequence: register plugins, run the
//! orchestrator, then start application logic. `start` only exists on the
//! value a successful `init` returns, so application logic can never run
//! before every plugin is started.
//!
//! - [`coordinator`]: the authoritative process. Negotiates per-connection
//!   configuration and hosts shared state.
//! - [`peer`]: one playback participant; several may share a process.
//! - [`fanout`]: one shared unlock control for co-resident peers.

pub mod coordinator;
pub mod experience;
pub mod fanout;
pub mod negotiation;
pub mod peer;
pub mod routes;

use thiserror::Error;

use crate::plugins::PluginError;
use crate::state::StateError;

pub use coordinator::{Coordinator, StartedCoordinator};
pub use experience::{PlayerExperience, ServerExperience};
pub use fanout::FanOutCoordinator;
pub use negotiation::{
    default_negotiation, ConnectionMetadata, NegotiatedConfig, NegotiationCallback,
};
pub use peer::{launch_peers, Peer, PeerHandle, PeerLaunch, PeerOptions, StartedPeer};
pub use routes::{app_router, AppState};

/// Errors that end a bootstrap attempt.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("shared state error: {0}")]
    State(#[from] StateError),

    #[error("failed to serialize run configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("bootstrap task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl BootstrapError {
    /// The plugin error behind this failure, if any.
    pub fn plugin_error(&self) -> Option<&PluginError> {
        match self {
            Self::Plugin(err) => Some(err),
            _ => None,
        }
    }
}
