//! Coordinator bootstrap.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use serde_json::json;

use super::experience::ServerExperience;
use super::negotiation::NegotiationCallback;
use super::routes::{app_router, AppState};
use super::BootstrapError;
use crate::capabilities::{
    AudioBufferLoaderOptions, AudioBufferLoaderPlugin, PlatformOptions, PlatformPlugin, SyncOptions,
    SyncPlugin, AUDIO_BUFFER_LOADER, PLATFORM, SYNC,
};
use crate::config::AppConfig;
use crate::plugins::{LifecycleOrchestrator, RunConfig, RuntimeContext};
use crate::state::{Schema, SharedState, StateManager};

/// Schema shared by every connected client.
pub fn globals_schema() -> Schema {
    BTreeMap::from([
        ("volume".to_string(), json!(1.0)),
        ("mute".to_string(), json!(false)),
    ])
}

/// Coordinator with its plugins registered, not yet initialized.
pub struct Coordinator {
    config: Arc<AppConfig>,
    context: Arc<RuntimeContext>,
    states: Arc<StateManager>,
    orchestrator: LifecycleOrchestrator,
}

impl Coordinator {
    /// Register the coordinator's plugins and state schemas.
    pub fn new(config: AppConfig) -> Result<Self, BootstrapError> {
        let context = Arc::new(RuntimeContext::new("coordinator"));
        context.register(
            AUDIO_BUFFER_LOADER,
            AudioBufferLoaderPlugin::new,
            AudioBufferLoaderOptions::default(),
            &[],
        )?;
        context.register(PLATFORM, PlatformPlugin::new, PlatformOptions::default(), &[])?;
        context.register(SYNC, SyncPlugin::new, SyncOptions::monotonic(), &[])?;

        let states = Arc::new(StateManager::new());
        states.register_schema("globals", globals_schema())?;
        states.register_schema("float", globals_schema())?;

        Ok(Self {
            config: Arc::new(config),
            context,
            states,
            orchestrator: LifecycleOrchestrator::default(),
        })
    }

    pub fn with_orchestrator(mut self, orchestrator: LifecycleOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Context handle, for extra registrations or observing state.
    pub fn context(&self) -> Arc<RuntimeContext> {
        self.context.clone()
    }

    pub fn states(&self) -> Arc<StateManager> {
        self.states.clone()
    }

    /// Initialize every plugin, then create the shared state peers expect
    /// to find when they connect.
    pub async fn init(self, negotiation: NegotiationCallback) -> Result<StartedCoordinator, BootstrapError> {
        let run = RunConfig::new(serde_json::to_value(&*self.config)?).with_negotiation(negotiation.clone());
        self.orchestrator.run(&self.context, &run).await?;

        let globals = self.states.create("globals")?;
        Ok(StartedCoordinator {
            config: self.config,
            context: self.context,
            states: self.states,
            negotiation,
            globals,
        })
    }
}

/// Coordinator whose plugins have all started.
pub struct StartedCoordinator {
    config: Arc<AppConfig>,
    context: Arc<RuntimeContext>,
    states: Arc<StateManager>,
    negotiation: NegotiationCallback,
    globals: SharedState,
}

impl StartedCoordinator {
    pub fn context(&self) -> Arc<RuntimeContext> {
        self.context.clone()
    }

    pub fn globals(&self) -> &SharedState {
        &self.globals
    }

    /// Start the player experience and build the HTTP router.
    pub fn start(self) -> Router {
        let mut experience = ServerExperience::new("player", self.globals.clone());
        experience.start();

        app_router(AppState {
            config: self.config,
            negotiation: self.negotiation,
            states: self.states,
            context: self.context,
            experience: Arc::new(experience),
        })
    }
}

impl std::fmt::Debug for StartedCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartedCoordinator")
            .field("app", &self.config.app.name)
            .field("context", &self.context)
            .field("globals", &self.globals.id())
            .finish()
    }
}
