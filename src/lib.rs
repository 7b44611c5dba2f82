//! # Ensemble
//!
//! Bootstrap for a distributed audio application: one coordinator process
//! and any number of playback peers, each built from named plugins with
//! declared dependencies.
//!
//! Both roles register their plugins on a [`plugins::RuntimeContext`], let
//! a [`plugins::LifecycleOrchestrator`] resolve and initialize them in
//! dependency order, and only then start their application logic. Peers
//! running side by side in one process share a single unlock gesture
//! through a [`runtime::FanOutCoordinator`].

pub mod capabilities;
pub mod clock;
pub mod config;
pub mod plugins;
pub mod runtime;
pub mod signal;
pub mod state;

pub use clock::AudioClock;
pub use config::AppConfig;
pub use plugins::{
    Dependencies, InitPolicy, LifecycleOrchestrator, OrchestratorConfig, Plugin, PluginContext,
    PluginError, PluginRegistry, RunConfig, RuntimeContext,
};
pub use runtime::{
    BootstrapError, Coordinator, FanOutCoordinator, NegotiatedConfig, Peer, PeerHandle, StartedCoordinator,
    StartedPeer,
};
pub use signal::{SignalSource, UnlockEvent};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
