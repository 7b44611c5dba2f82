//! Plugin system shared by the coordinator and every peer.
//!
//! - [`registry`] holds named declarations and their dependency edges.
//! - [`dependency`] resolves them into a stable initialization order.
//! - [`orchestrator`] constructs and initializes them in that order.
//! - [`context`] owns a registry and exposes the resulting instances.

pub mod context;
pub mod dependency;
pub mod error;
pub mod orchestrator;
pub mod plugin;
pub mod registry;

pub use context::{ContextState, PluginInstance, PluginState, RuntimeContext};
pub use dependency::resolve_order;
pub use error::PluginError;
pub use orchestrator::{InitPolicy, LifecycleOrchestrator, OrchestratorConfig, RunConfig};
pub use plugin::{Dependencies, Plugin, PluginContext, PluginHandle};
pub use registry::{PluginDeclaration, PluginRegistry};
