//! The `Plugin` trait and the handles a plugin sees while it initializes.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::runtime::negotiation::NegotiationCallback;

/// A named capability with an asynchronous init step.
///
/// Plugins are constructed by the factory given at registration time, then
/// initialized once every one of their dependencies has been started.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Initialize the plugin.
    ///
    /// An error moves the plugin to `Errored` and aborts the owning runtime
    /// context.
    async fn init(&self, ctx: &PluginContext) -> anyhow::Result<()>;
}

/// Shared reference to a constructed plugin, keeping both the trait object
/// and a type-erased view for downcasting.
#[derive(Clone)]
pub struct PluginHandle {
    plugin: Arc<dyn Plugin>,
    any: Arc<dyn Any + Send + Sync>,
}

impl PluginHandle {
    pub(crate) fn new<P: Plugin>(plugin: P) -> Self {
        let plugin = Arc::new(plugin);
        Self {
            plugin: plugin.clone(),
            any: plugin,
        }
    }

    /// The plugin as a trait object.
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    /// Recover the concrete plugin type.
    pub fn downcast<P: Plugin>(&self) -> Option<Arc<P>> {
        self.any.clone().downcast::<P>().ok()
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PluginHandle(..)")
    }
}

/// Started dependency instances visible to one plugin, keyed by name.
#[derive(Clone, Default)]
pub struct Dependencies {
    handles: BTreeMap<String, PluginHandle>,
}

impl Dependencies {
    /// Typed access to a started dependency.
    pub fn get<P: Plugin>(&self, name: &str) -> Option<Arc<P>> {
        self.handles.get(name).and_then(PluginHandle::downcast)
    }

    /// Untyped access to a started dependency.
    pub fn handle(&self, name: &str) -> Option<&PluginHandle> {
        self.handles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, handle: PluginHandle) {
        self.handles.insert(name.into(), handle);
    }

    /// Restrict to the given names; names not present are skipped.
    pub(crate) fn subset(&self, names: &[String]) -> Self {
        let handles = names
            .iter()
            .filter_map(|n| self.handles.get(n).map(|h| (n.clone(), h.clone())))
            .collect();
        Self { handles }
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handles.keys()).finish()
    }
}

/// Everything handed to [`Plugin::init`].
#[derive(Clone)]
pub struct PluginContext {
    name: String,
    config: Arc<Value>,
    dependencies: Dependencies,
    negotiation: Option<NegotiationCallback>,
}

impl PluginContext {
    pub(crate) fn new(
        name: impl Into<String>,
        config: Arc<Value>,
        dependencies: Dependencies,
        negotiation: Option<NegotiationCallback>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            dependencies,
            negotiation,
        }
    }

    /// Registered name of the plugin being initialized.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration value the runtime context was run with.
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Per-connection negotiation callback (coordinator role only).
    pub fn negotiation(&self) -> Option<&NegotiationCallback> {
        self.negotiation.as_ref()
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("negotiation", &self.negotiation.is_some())
            .finish()
    }
}
