//! Platform plugin: feature availability, gated on a user gesture.
//!
//! With the `web-audio` feature the plugin only finishes its init once an
//! unlock signal reaches its [`UnlockGate`]; it then resumes the audio clock
//! so that dependents start against a running clock.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::clock::AudioClock;
use crate::plugins::{Dependencies, Plugin, PluginContext};
use crate::signal::UnlockEvent;

/// Latch that opens at most once with the unlock event that opened it.
#[derive(Debug, Clone)]
pub struct UnlockGate {
    slot: Arc<watch::Sender<Option<UnlockEvent>>>,
}

impl Default for UnlockGate {
    fn default() -> Self {
        Self::new()
    }
}

impl UnlockGate {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot: Arc::new(slot) }
    }

    /// Open the gate. Returns `false` if it was already open.
    pub fn open(&self, event: UnlockEvent) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(event);
            true
        })
    }

    pub fn is_open(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// The event that opened the gate.
    pub fn event(&self) -> Option<UnlockEvent> {
        self.slot.borrow().clone()
    }

    /// Wait until the gate is open.
    pub async fn wait(&self) -> UnlockEvent {
        let mut rx = self.slot.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(event) = current {
                return event;
            }
            // The sender lives as long as `self`, so this cannot close.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// A platform feature the plugin checks before starting.
#[derive(Debug, Clone)]
pub enum PlatformFeature {
    /// Audio output through the given clock; needs a user gesture.
    WebAudio(AudioClock),
}

impl PlatformFeature {
    pub fn id(&self) -> &'static str {
        match self {
            Self::WebAudio(_) => "web-audio",
        }
    }

    fn requires_gesture(&self) -> bool {
        matches!(self, Self::WebAudio(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlatformOptions {
    pub features: Vec<PlatformFeature>,
    /// Required when a feature needs a user gesture.
    pub unlock: Option<UnlockGate>,
}

pub struct PlatformPlugin {
    options: PlatformOptions,
    unlocked_by: Mutex<Option<UnlockEvent>>,
}

impl PlatformPlugin {
    pub fn new(options: PlatformOptions, _deps: &Dependencies) -> anyhow::Result<Self> {
        if options.features.iter().any(PlatformFeature::requires_gesture) && options.unlock.is_none() {
            anyhow::bail!("platform features need an unlock gate");
        }
        Ok(Self {
            options,
            unlocked_by: Mutex::new(None),
        })
    }

    pub fn features(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.options.features.iter().map(PlatformFeature::id)
    }

    pub fn audio_clock(&self) -> Option<&AudioClock> {
        self.options.features.iter().map(|f| match f {
            PlatformFeature::WebAudio(clock) => clock,
        }).next()
    }

    /// `true` when no audio clock is involved or it is running.
    pub fn audio_resumed(&self) -> bool {
        self.audio_clock().map_or(true, AudioClock::is_running)
    }

    /// The gesture that unlocked the platform, once it happened.
    pub fn unlocked_by(&self) -> Option<UnlockEvent> {
        self.unlocked_by.lock().clone()
    }
}

#[async_trait]
impl Plugin for PlatformPlugin {
    async fn init(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        let needs_gesture = self.options.features.iter().any(PlatformFeature::requires_gesture);
        if !needs_gesture {
            return Ok(());
        }

        let gate = self
            .options
            .unlock
            .as_ref()
            .context("platform features need an unlock gate")?;
        log::info!("[{}] Waiting for a user gesture to resume audio", ctx.name());
        let event = gate.wait().await;

        if let Some(clock) = self.audio_clock() {
            clock.resume();
        }
        log::debug!("[{}] Unlocked by '{}'", ctx.name(), event.channel);
        *self.unlocked_by.lock() = Some(event);
        Ok(())
    }
}
