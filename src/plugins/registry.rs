//! Plugin registry: named declarations and their dependency edges.
//!
//! One registry belongs to one runtime context. Declarations keep their
//! registration order, which the resolver uses as its tie-break.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::PluginError;
use super::plugin::{Dependencies, Plugin, PluginHandle};

type ErasedFactory = Arc<dyn Fn(&Dependencies) -> anyhow::Result<PluginHandle> + Send + Sync>;

/// A registered plugin: name, factory, options, and dependency names.
///
/// Immutable once registered.
#[derive(Clone)]
pub struct PluginDeclaration {
    name: String,
    factory: ErasedFactory,
    options: Arc<dyn Any + Send + Sync>,
    options_type: &'static str,
    dependencies: Vec<String>,
}

impl PluginDeclaration {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dependency names, de-duplicated, in declaration order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// The options value, if it is of type `O`.
    pub fn options<O: 'static>(&self) -> Option<&O> {
        self.options.downcast_ref::<O>()
    }

    /// Type name of the options value.
    pub fn options_type(&self) -> &'static str {
        self.options_type
    }

    /// Build the plugin from its options and started dependencies.
    pub(crate) fn construct(&self, dependencies: &Dependencies) -> anyhow::Result<PluginHandle> {
        (self.factory)(dependencies)
    }
}

impl fmt::Debug for PluginDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDeclaration")
            .field("name", &self.name)
            .field("options", &self.options_type)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Registry of plugin declarations for a single runtime instance.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    declarations: Vec<PluginDeclaration>,
    index: HashMap<String, usize>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    ///
    /// `factory` receives a clone of `options` and the started dependency
    /// handles. Dependencies may name plugins registered later; they only
    /// have to exist by resolution time. A second registration under the
    /// same name is rejected and the first one is kept unchanged.
    pub fn register<P, O, F>(
        &mut self,
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
        if self.index.contains_key(&name) {
            log::warn!("[PluginRegistry] Rejected duplicate registration of '{}'", name);
            return Err(PluginError::DuplicateRegistration(name));
        }

        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.iter().any(|d| d == dep) {
                deps.push((*dep).to_string());
            }
        }

        let options = Arc::new(options);
        let factory_options = options.clone();
        let factory: ErasedFactory = Arc::new(move |deps: &Dependencies| {
            let plugin = factory(O::clone(&factory_options), deps)?;
            Ok(PluginHandle::new(plugin))
        });

        log::debug!("[PluginRegistry] Registered '{}' (depends on {:?})", name, deps);
        self.index.insert(name.clone(), self.declarations.len());
        self.declarations.push(PluginDeclaration {
            name,
            factory,
            options,
            options_type: std::any::type_name::<O>(),
            dependencies: deps,
        });
        Ok(())
    }

    /// All declarations, in registration order.
    pub fn declarations(&self) -> &[PluginDeclaration] {
        &self.declarations
    }

    pub fn get(&self, name: &str) -> Option<&PluginDeclaration> {
        self.index.get(name).map(|&i| &self.declarations[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.declarations.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}
