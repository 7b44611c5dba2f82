//! Peer bootstrap.
//!
//! Each peer owns its own [`RuntimeContext`], audio clock and unlock gate.
//! [`launch_peers`] starts K of them side by side in one process, each in
//! its own task, and wires a [`FanOutCoordinator`] when K >= 2.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::experience::PlayerExperience;
use super::fanout::FanOutCoordinator;
use super::negotiation::NegotiatedConfig;
use super::BootstrapError;
use crate::capabilities::{
    AudioBufferLoaderOptions, AudioBufferLoaderPlugin, PlatformFeature, PlatformOptions, PlatformPlugin,
    SyncOptions, SyncPlugin, UnlockGate, AUDIO_BUFFER_LOADER, PLATFORM, SYNC,
};
use crate::clock::AudioClock;
use crate::plugins::{LifecycleOrchestrator, RunConfig, RuntimeContext};
use crate::signal::{SignalSource, UnlockEvent};

pub const DEFAULT_ASSETS_DIR: &str = "public";

#[derive(Debug, Clone)]
pub struct PeerOptions {
    /// Directory the audio file paths are relative to.
    pub assets_dir: PathBuf,
    /// Buffer id -> file path.
    pub audio_files: BTreeMap<String, String>,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            audio_files: BTreeMap::from([("1".to_string(), "sounds/SoniaBerbec.mp3".to_string())]),
        }
    }
}

/// Cloneable handle used to forward an unlock signal to one peer.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    index: usize,
    gate: Option<UnlockGate>,
}

impl PeerHandle {
    /// `gate` is `None` for a peer without a `platform` plugin.
    pub fn new(index: usize, gate: Option<UnlockGate>) -> Self {
        Self { index, gate }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Forward an unlock signal. Returns whether the peer accepted it; a
    /// peer accepts at most one.
    pub fn deliver_unlock_signal(&self, event: &UnlockEvent) -> bool {
        match &self.gate {
            Some(gate) => gate.open(event.clone()),
            None => {
                log::debug!("[peer:{}] No platform plugin, ignoring '{}'", self.index, event.channel);
                false
            }
        }
    }
}

/// Peer with its plugins registered, not yet initialized.
pub struct Peer {
    index: usize,
    context: Arc<RuntimeContext>,
    clock: AudioClock,
    gate: UnlockGate,
    orchestrator: LifecycleOrchestrator,
}

impl Peer {
    pub fn new(index: usize, options: PeerOptions) -> Result<Self, BootstrapError> {
        let context = Arc::new(RuntimeContext::new(format!("peer-{index}")));
        let clock = AudioClock::new();
        let gate = UnlockGate::new();

        context.register(
            PLATFORM,
            PlatformPlugin::new,
            PlatformOptions {
                features: vec![PlatformFeature::WebAudio(clock.clone())],
                unlock: Some(gate.clone()),
            },
            &[],
        )?;
        context.register(
            AUDIO_BUFFER_LOADER,
            AudioBufferLoaderPlugin::new,
            AudioBufferLoaderOptions {
                base_dir: options.assets_dir,
                data: options.audio_files,
            },
            &[],
        )?;
        context.register(SYNC, SyncPlugin::new, SyncOptions::from_clock(clock.clone()), &[PLATFORM])?;

        Ok(Self {
            index,
            context,
            clock,
            gate,
            orchestrator: LifecycleOrchestrator::default(),
        })
    }

    pub fn with_orchestrator(mut self, orchestrator: LifecycleOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn context(&self) -> Arc<RuntimeContext> {
        self.context.clone()
    }

    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }

    pub fn handle(&self) -> PeerHandle {
        let gate = self.context.contains(PLATFORM).then(|| self.gate.clone());
        PeerHandle::new(self.index, gate)
    }

    /// Initialize every plugin with the negotiated configuration. Stays
    /// pending until the peer receives an unlock signal.
    pub async fn init(self, negotiated: &NegotiatedConfig) -> Result<StartedPeer, BootstrapError> {
        let run = RunConfig::new(serde_json::to_value(negotiated)?);
        self.orchestrator.run(&self.context, &run).await?;
        Ok(StartedPeer {
            index: self.index,
            context: self.context,
            clock: self.clock,
        })
    }
}

/// Peer whose plugins have all started.
pub struct StartedPeer {
    index: usize,
    context: Arc<RuntimeContext>,
    clock: AudioClock,
}

impl StartedPeer {
    pub fn context(&self) -> Arc<RuntimeContext> {
        self.context.clone()
    }

    pub fn start(self) -> PlayerExperience {
        let mut experience = PlayerExperience::new(self.index, &self.context, self.clock);
        experience.start();
        experience
    }
}

impl std::fmt::Debug for StartedPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartedPeer")
            .field("index", &self.index)
            .field("context", &self.context)
            .finish()
    }
}

/// K peers running side by side.
pub struct PeerLaunch {
    handles: Vec<PeerHandle>,
    tasks: Vec<JoinHandle<Result<PlayerExperience, BootstrapError>>>,
    fanout: Option<FanOutCoordinator>,
}

impl PeerLaunch {
    pub fn handles(&self) -> &[PeerHandle] {
        &self.handles
    }

    pub fn fanout(&self) -> Option<&FanOutCoordinator> {
        self.fanout.as_ref()
    }

    /// Route the physical signal sources to the peers: through the fan-out
    /// coordinator when there is one, straight to the single peer otherwise.
    pub fn bind(&self, sources: &[Arc<SignalSource>]) -> usize {
        if let Some(fanout) = &self.fanout {
            return fanout.bind(sources);
        }
        for handle in &self.handles {
            for source in sources {
                let handle = handle.clone();
                source.subscribe(move |event| {
                    handle.deliver_unlock_signal(event);
                });
            }
        }
        sources.len() * self.handles.len()
    }

    /// Wait for every peer. Results are in peer index order.
    pub async fn join(self) -> Vec<Result<PlayerExperience, BootstrapError>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            results.push(task.await.unwrap_or_else(|err| Err(BootstrapError::Task(err))));
        }
        results
    }
}

/// Create `count` peers, track them on a fan-out coordinator when
/// `count >= 2`, and spawn their bootstraps.
pub fn launch_peers(
    count: usize,
    options: impl Fn(usize) -> PeerOptions,
    negotiated: Arc<NegotiatedConfig>,
    orchestrator: LifecycleOrchestrator,
) -> Result<PeerLaunch, BootstrapError> {
    let fanout = FanOutCoordinator::for_peer_count(count);
    let mut handles = Vec::with_capacity(count);
    let mut tasks = Vec::with_capacity(count);

    for index in 0..count {
        let peer = Peer::new(index, options(index))?.with_orchestrator(orchestrator.clone());
        let handle = peer.handle();
        if let Some(fanout) = &fanout {
            fanout.track(handle.clone());
        }
        handles.push(handle);

        let negotiated = negotiated.clone();
        tasks.push(tokio::spawn(async move {
            let started = peer.init(&negotiated).await.map_err(|err| {
                log::error!("[peer:{}] Bootstrap failed: {}", index, err);
                err
            })?;
            Ok(started.start())
        }));
    }

    log::info!("[peers] Launched {} peer(s)", count);
    Ok(PeerLaunch { handles, tasks, fanout })
}
