//! Runtime context: one registry plus the instances it resolved into.
//!
//! A context exists per role instance: one for the coordinator and one for
//! every peer, emulated peers included. Its state is observable from other
//! tasks while the orchestrator drives it.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use super::error::PluginError;
use super::plugin::{Dependencies, Plugin, PluginHandle};
use super::registry::{PluginDeclaration, PluginRegistry};

/// Lifecycle state of a single plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Registered,
    Resolving,
    Initializing,
    Started,
    Errored,
}

impl PluginState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Started | Self::Errored)
    }

    /// Transitions are monotonic and never leave a terminal state.
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Registered, Resolving)
                | (Resolving, Initializing)
                | (Resolving, Errored)
                | (Initializing, Started)
                | (Initializing, Errored)
        )
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::Resolving => "resolving",
            Self::Initializing => "initializing",
            Self::Started => "started",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Overall state of a runtime context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    /// Accepting registrations.
    Registering,
    /// Validating the dependency graph.
    Resolving,
    /// Driving plugin inits.
    Initializing,
    Started,
    /// Permanent; a fresh context is needed to try again.
    Errored,
}

/// A plugin as processed by the orchestrator.
#[derive(Clone)]
pub struct PluginInstance {
    pub name: String,
    pub state: PluginState,
    pub value: Option<PluginHandle>,
    pub error: Option<Arc<anyhow::Error>>,
}

impl PluginInstance {
    fn registered(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: PluginState::Registered,
            value: None,
            error: None,
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("has_value", &self.value.is_some())
            .field("error", &self.error.as_ref().map(|e| format!("{e:#}")))
            .finish()
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: ContextState,
    failure: Option<PluginError>,
    instances: Vec<PluginInstance>,
    /// Set once `begin_resolution` has been called.
    ran: bool,
}

/// Owns one [`PluginRegistry`] and, after resolution, its instances.
pub struct RuntimeContext {
    id: Uuid,
    label: String,
    registry: RwLock<PluginRegistry>,
    lifecycle: RwLock<Lifecycle>,
}

impl RuntimeContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            registry: RwLock::new(PluginRegistry::new()),
            lifecycle: RwLock::new(Lifecycle {
                state: ContextState::Registering,
                failure: None,
                instances: Vec::new(),
                ran: false,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Register a plugin in this context's registry.
    ///
    /// Only allowed before the context is run.
    pub fn register<P, O, F>(
        &self,
        name: impl Into<String>,
        factory: F,
        options: O,
        dependencies: &[&str],
    ) -> Result<(), PluginError>
    where
        P: Plugin,
        O: Clone + Send + Sync + 'static,
        F: Fn(O, &Dependencies) -> anyhow::Result<P> + Send + Sync + 'static,
    {
        let name = name.into();
        // Held across the registry write so a concurrent run cannot start
        // resolution halfway through.
        let mut lifecycle = self.lifecycle.write();
        if lifecycle.state != ContextState::Registering {
            return Err(PluginError::RegistrationClosed(name));
        }
        let result = self
            .registry
            .write()
            .register(name, factory, options, dependencies);
        if let Err(err) = &result {
            // A rejected registration ends this bootstrap attempt; `run`
            // reports it instead of resolving.
            log::error!("[{}] Registration failed: {}", self.label, err);
            lifecycle.state = ContextState::Errored;
            lifecycle.failure.get_or_insert_with(|| err.clone());
        }
        result
    }

    /// Whether a plugin with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.registry.read().contains(name)
    }

    /// Snapshot of the declarations, in registration order.
    pub fn declarations(&self) -> Vec<PluginDeclaration> {
        self.registry.read().declarations().to_vec()
    }

    pub fn state(&self) -> ContextState {
        self.lifecycle.read().state
    }

    pub fn is_errored(&self) -> bool {
        self.state() == ContextState::Errored
    }

    /// The error that moved the context to `Errored`.
    pub fn failure(&self) -> Option<PluginError> {
        self.lifecycle.read().failure.clone()
    }

    pub fn instance(&self, name: &str) -> Option<PluginInstance> {
        self.lifecycle
            .read()
            .instances
            .iter()
            .find(|i| i.name == name)
            .cloned()
    }

    /// All instances, in resolved order. Empty before resolution.
    pub fn instances(&self) -> Vec<PluginInstance> {
        self.lifecycle.read().instances.clone()
    }

    /// Typed access to a started plugin.
    pub fn plugin<P: Plugin>(&self, name: &str) -> Option<Arc<P>> {
        let lifecycle = self.lifecycle.read();
        lifecycle
            .instances
            .iter()
            .find(|i| i.name == name && i.state == PluginState::Started)
            .and_then(|i| i.value.as_ref())
            .and_then(PluginHandle::downcast)
    }

    // -----------------------------------------------------------------------
    // Orchestrator-side transitions
    // -----------------------------------------------------------------------

    pub(crate) fn begin_resolution(&self) -> Result<(), PluginError> {
        let mut lifecycle = self.lifecycle.write();
        if lifecycle.ran {
            return Err(PluginError::AlreadyRun(self.label.clone()));
        }
        lifecycle.ran = true;
        if lifecycle.state != ContextState::Registering {
            if let Some(failure) = &lifecycle.failure {
                return Err(failure.clone());
            }
            return Err(PluginError::AlreadyRun(self.label.clone()));
        }
        lifecycle.state = ContextState::Resolving;
        Ok(())
    }

    pub(crate) fn begin_initialization(&self, order: &[String]) {
        let mut lifecycle = self.lifecycle.write();
        lifecycle.instances = order.iter().map(PluginInstance::registered).collect();
        lifecycle.state = ContextState::Initializing;
    }

    pub(crate) fn transition(&self, name: &str, next: PluginState) {
        self.update(name, next, |_| {});
    }

    pub(crate) fn attach_value(&self, name: &str, value: PluginHandle) {
        self.update(name, PluginState::Initializing, |instance| {
            instance.value = Some(value);
        });
    }

    pub(crate) fn record_failure(&self, name: &str, cause: Arc<anyhow::Error>) {
        self.update(name, PluginState::Errored, |instance| {
            instance.error = Some(cause);
        });
    }

    pub(crate) fn mark_started(&self) {
        let mut lifecycle = self.lifecycle.write();
        if lifecycle.state == ContextState::Initializing {
            lifecycle.state = ContextState::Started;
        }
    }

    /// Errored is permanent, so the first failure is the one kept.
    pub(crate) fn mark_errored(&self, error: PluginError) {
        let mut lifecycle = self.lifecycle.write();
        lifecycle.state = ContextState::Errored;
        if lifecycle.failure.is_none() {
            lifecycle.failure = Some(error);
        }
    }

    fn update(&self, name: &str, next: PluginState, apply: impl FnOnce(&mut PluginInstance)) {
        let mut lifecycle = self.lifecycle.write();
        let Some(instance) = lifecycle.instances.iter_mut().find(|i| i.name == name) else {
            log::warn!("[{}] No instance named '{}'", self.label, name);
            return;
        };
        if !instance.state.can_transition_to(next) {
            log::warn!(
                "[{}] Ignoring transition of '{}' from {} to {}",
                self.label,
                name,
                instance.state,
                next
            );
            return;
        }
        log::debug!("[{}] '{}': {} -> {}", self.label, name, instance.state, next);
        instance.state = next;
        apply(instance);
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state())
            .finish()
    }
}
