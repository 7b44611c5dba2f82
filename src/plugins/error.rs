//! Plugin system errors.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised while registering, resolving, or initializing plugins.
///
/// `DuplicateRegistration`, `UnresolvedDependency`, and `CyclicDependency`
/// are structural: they are detected before any plugin is initialized and
/// are fatal to that bootstrap attempt. `CapabilityInitFailure` carries the
/// failing plugin's own cause.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// A plugin with this name is already registered.
    #[error("plugin '{0}' is already registered")]
    DuplicateRegistration(String),

    /// A declared dependency is not registered.
    #[error("plugin '{name}' depends on '{missing}', which is not registered")]
    UnresolvedDependency { name: String, missing: String },

    /// The dependency graph contains a cycle.
    #[error("cyclic plugin dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A plugin's factory or init entry point failed.
    #[error("plugin '{name}' failed to initialize: {cause:#}")]
    CapabilityInitFailure {
        name: String,
        cause: Arc<anyhow::Error>,
    },

    /// Per-connection configuration negotiation failed.
    #[error("negotiation failed: {0:#}")]
    NegotiationFailure(Arc<anyhow::Error>),

    /// The context no longer accepts registrations.
    #[error("cannot register '{0}': the runtime context has already been run")]
    RegistrationClosed(String),

    /// The context was already driven once; a fresh context is required.
    #[error("runtime context '{0}' has already been run")]
    AlreadyRun(String),
}

impl PluginError {
    /// Whether the error was detected before any plugin init began.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRegistration(_)
                | Self::UnresolvedDependency { .. }
                | Self::CyclicDependency { .. }
        )
    }

    /// Wrap a negotiation cause.
    pub fn negotiation(cause: anyhow::Error) -> Self {
        Self::NegotiationFailure(Arc::new(cause))
    }
}
