//! Clock synchronization plugin.
//!
//! Holds the local time function the synchronization process reads. The
//! offset estimation itself runs elsewhere and reports through
//! [`SyncPlugin::apply_offset`]; this plugin only guarantees it starts on a
//! running clock.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::platform::PlatformPlugin;
use crate::clock::AudioClock;
use crate::plugins::{Dependencies, Plugin, PluginContext};

/// Local time source, in seconds.
pub type TimeFn = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Clone)]
pub struct SyncOptions {
    pub get_time: TimeFn,
}

impl SyncOptions {
    /// Read time from an audio clock.
    pub fn from_clock(clock: AudioClock) -> Self {
        Self {
            get_time: Arc::new(move || clock.current_time()),
        }
    }

    /// Read time from the process monotonic clock.
    pub fn monotonic() -> Self {
        let origin = Instant::now();
        Self {
            get_time: Arc::new(move || origin.elapsed().as_secs_f64()),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::monotonic()
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions").finish_non_exhaustive()
    }
}

pub struct SyncPlugin {
    get_time: TimeFn,
    offset: RwLock<f64>,
    started_at: RwLock<Option<f64>>,
}

impl SyncPlugin {
    pub fn new(options: SyncOptions, _deps: &Dependencies) -> anyhow::Result<Self> {
        Ok(Self {
            get_time: options.get_time,
            offset: RwLock::new(0.0),
            started_at: RwLock::new(None),
        })
    }

    pub fn local_time(&self) -> f64 {
        (self.get_time)()
    }

    /// Local time translated to the shared reference.
    pub fn sync_time(&self) -> f64 {
        self.local_time() + *self.offset.read()
    }

    /// Record the latest offset estimate.
    pub fn apply_offset(&self, offset: f64) {
        *self.offset.write() = offset;
    }

    /// Local time at which the plugin started.
    pub fn started_at(&self) -> Option<f64> {
        *self.started_at.read()
    }
}

#[async_trait]
impl Plugin for SyncPlugin {
    async fn init(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        if let Some(platform) = ctx.dependencies().get::<PlatformPlugin>("platform") {
            if !platform.audio_resumed() {
                anyhow::bail!("audio clock is suspended");
            }
        }
        let now = self.local_time();
        *self.started_at.write() = Some(now);
        log::debug!("[{}] Started at local time {:.3}", ctx.name(), now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::platform::{PlatformFeature, PlatformOptions, UnlockGate};
    use crate::plugins::{LifecycleOrchestrator, PluginHandle, PluginState, RunConfig, RuntimeContext};
    use crate::signal::UnlockEvent;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sync_starts_after_platform_on_running_clock() {
        let clock = AudioClock::new();
        let gate = UnlockGate::new();
        gate.open(UnlockEvent::new("touchend"));

        let ctx = RuntimeContext::new("peer");
        ctx.register("sync", SyncPlugin::new, SyncOptions::from_clock(clock.clone()), &["platform"])
            .unwrap();
        ctx.register(
            "platform",
            PlatformPlugin::new,
            PlatformOptions {
                features: vec![PlatformFeature::WebAudio(clock.clone())],
                unlock: Some(gate),
            },
            &[],
        )
        .unwrap();

        LifecycleOrchestrator::default()
            .run(&ctx, &RunConfig::default())
            .await
            .unwrap();

        let sync = ctx.plugin::<SyncPlugin>("sync").unwrap();
        assert!(sync.started_at().is_some());
        sync.apply_offset(10.0);
        assert!(sync.sync_time() >= 10.0);
    }

    #[tokio::test]
    async fn test_sync_refuses_suspended_clock() {
        let platform = PlatformPlugin::new(
            PlatformOptions {
                features: vec![PlatformFeature::WebAudio(AudioClock::new())],
                unlock: Some(UnlockGate::new()),
            },
            &Dependencies::default(),
        )
        .unwrap();
        assert!(!platform.audio_resumed());

        let mut deps = Dependencies::default();
        deps.insert("platform", PluginHandle::new(platform));
        let sync = SyncPlugin::new(SyncOptions::monotonic(), &deps).unwrap();
        let ctx = PluginContext::new("sync", Default::default(), deps, None);

        let err = sync.init(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("suspended"));
        assert!(sync.started_at().is_none());
    }

    #[tokio::test]
    async fn test_sync_waits_while_platform_is_locked() {
        let clock = AudioClock::new();
        let ctx = RuntimeContext::new("peer");
        ctx.register(
            "platform",
            PlatformPlugin::new,
            PlatformOptions {
                features: vec![PlatformFeature::WebAudio(clock.clone())],
                unlock: Some(UnlockGate::new()),
            },
            &[],
        )
        .unwrap();
        ctx.register("sync", SyncPlugin::new, SyncOptions::from_clock(clock), &["platform"])
            .unwrap();

        let run = tokio::time::timeout(
            Duration::from_millis(20),
            LifecycleOrchestrator::default().run(&ctx, &RunConfig::default()),
        )
        .await;
        assert!(run.is_err());
        assert_eq!(ctx.instance("platform").unwrap().state, PluginState::Initializing);
        assert_eq!(ctx.instance("sync").unwrap().state, PluginState::Registered);
    }
}
