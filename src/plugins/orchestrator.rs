//! Lifecycle orchestrator: drives plugins through construct and init in
//! dependency order.
//!
//! The only suspension points are plugin init calls. A plugin is never
//! constructed or initialized before every one of its dependencies has
//! reached `Started` in the same context.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;

use super::context::{PluginState, RuntimeContext};
use super::dependency::resolve_order;
use super::error::PluginError;
use super::plugin::{Dependencies, PluginContext, PluginHandle};
use super::registry::{PluginDeclaration, PluginRegistry};
use crate::runtime::negotiation::NegotiationCallback;

/// How independent branches of the dependency graph are initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitPolicy {
    /// Launch every plugin whose dependencies are started. On the first
    /// failure nothing new is launched and in-flight inits are cancelled;
    /// cancelled plugins stay `Initializing`.
    #[default]
    Concurrent,
    /// One init at a time, in resolved order.
    Sequential,
}

/// Orchestrator settings.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub policy: InitPolicy,
    /// Upper bound for a single init. `None` waits indefinitely.
    pub init_timeout: Option<Duration>,
}

/// Values handed to every plugin init of one run.
#[derive(Clone, Default)]
pub struct RunConfig {
    config: Arc<Value>,
    negotiation: Option<NegotiationCallback>,
}

impl RunConfig {
    pub fn new(config: Value) -> Self {
        Self {
            config: Arc::new(config),
            negotiation: None,
        }
    }

    /// Supply the coordinator's per-connection negotiation callback.
    pub fn with_negotiation(mut self, negotiation: NegotiationCallback) -> Self {
        self.negotiation = Some(negotiation);
        self
    }

    pub fn config(&self) -> &Value {
        &self.config
    }
}

type InitFuture = Pin<Box<dyn Future<Output = (String, PluginHandle, anyhow::Result<()>)> + Send>>;

/// Resolves and initializes the plugins of a [`RuntimeContext`].
#[derive(Debug, Clone, Default)]
pub struct LifecycleOrchestrator {
    config: OrchestratorConfig,
}

impl LifecycleOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn sequential() -> Self {
        Self::new(OrchestratorConfig {
            policy: InitPolicy::Sequential,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Compute the initialization order of a registry.
    pub fn resolve(&self, registry: &PluginRegistry) -> Result<Vec<String>, PluginError> {
        resolve_order(registry.declarations())
    }

    /// Resolve the context's registry, then construct and initialize every
    /// plugin.
    ///
    /// Structural errors are returned before any plugin is constructed. The
    /// first init failure marks that plugin and the context `Errored` and is
    /// returned as is. Either way the context never leaves `Errored`.
    pub async fn run(&self, ctx: &RuntimeContext, run: &RunConfig) -> Result<(), PluginError> {
        ctx.begin_resolution()?;

        let declarations = ctx.declarations();
        let order = match resolve_order(&declarations) {
            Ok(order) => order,
            Err(err) => {
                log::error!("[{}] Plugin resolution failed: {}", ctx.label(), err);
                ctx.mark_errored(err.clone());
                return Err(err);
            }
        };
        log::debug!("[{}] Resolved plugin order: {:?}", ctx.label(), order);
        ctx.begin_initialization(&order);

        let by_name: HashMap<&str, &PluginDeclaration> =
            declarations.iter().map(|d| (d.name(), d)).collect();
        let mut pending: Vec<&PluginDeclaration> =
            order.iter().filter_map(|n| by_name.get(n.as_str()).copied()).collect();

        let mut started = Dependencies::default();
        let mut in_flight: FuturesUnordered<InitFuture> = FuturesUnordered::new();

        loop {
            let capacity = match self.config.policy {
                InitPolicy::Concurrent => usize::MAX,
                InitPolicy::Sequential => 1usize.saturating_sub(in_flight.len()),
            };

            let mut launched = 0;
            let mut i = 0;
            while i < pending.len() && launched < capacity {
                let ready = pending[i]
                    .dependencies()
                    .iter()
                    .all(|dep| started.contains(dep));
                if !ready {
                    i += 1;
                    continue;
                }
                let decl = pending.remove(i);
                match self.launch(ctx, decl, &started, run) {
                    Ok(fut) => in_flight.push(fut),
                    Err(cause) => return Err(fail(ctx, decl.name(), cause)),
                }
                launched += 1;
            }

            let Some((name, handle, result)) = in_flight.next().await else {
                break;
            };
            match result {
                Ok(()) => {
                    ctx.transition(&name, PluginState::Started);
                    started.insert(name, handle);
                }
                // Returning drops `in_flight`, cancelling unrelated branches.
                Err(cause) => return Err(fail(ctx, &name, cause)),
            }
        }

        if !pending.is_empty() {
            // Unreachable for a resolved graph; kept as a hard stop.
            let err = PluginError::UnresolvedDependency {
                name: pending[0].name().to_string(),
                missing: pending[0]
                    .dependencies()
                    .iter()
                    .find(|d| !started.contains(d))
                    .cloned()
                    .unwrap_or_default(),
            };
            ctx.mark_errored(err.clone());
            return Err(err);
        }

        ctx.mark_started();
        log::info!("[{}] {} plugin(s) started", ctx.label(), started.len());
        Ok(())
    }

    /// Construct a plugin and return its pending init.
    fn launch(
        &self,
        ctx: &RuntimeContext,
        decl: &PluginDeclaration,
        started: &Dependencies,
        run: &RunConfig,
    ) -> anyhow::Result<InitFuture> {
        let name = decl.name().to_string();
        ctx.transition(&name, PluginState::Resolving);

        let dependencies = started.subset(decl.dependencies());
        let handle = decl.construct(&dependencies)?;
        ctx.attach_value(&name, handle.clone());

        let plugin_ctx = PluginContext::new(
            name.clone(),
            run.config.clone(),
            dependencies,
            run.negotiation.clone(),
        );
        let timeout = self.config.init_timeout;

        Ok(Box::pin(async move {
            let plugin = handle.plugin().clone();
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, plugin.init(&plugin_ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("init timed out after {:?}", limit)),
                },
                None => plugin.init(&plugin_ctx).await,
            };
            (name, handle, result)
        }))
    }
}

fn fail(ctx: &RuntimeContext, name: &str, cause: anyhow::Error) -> PluginError {
    let cause = Arc::new(cause);
    ctx.record_failure(name, cause.clone());
    let err = PluginError::CapabilityInitFailure {
        name: name.to_string(),
        cause,
    };
    log::error!("[{}] {}", ctx.label(), err);
    ctx.mark_errored(err.clone());
    err
}
