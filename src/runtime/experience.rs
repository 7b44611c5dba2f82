//! Application logic started once a runtime context is `Started`.

use std::sync::Arc;

use serde_json::json;

use crate::capabilities::{AudioBufferLoaderPlugin, SyncPlugin, AUDIO_BUFFER_LOADER, SYNC};
use crate::clock::AudioClock;
use crate::plugins::RuntimeContext;
use crate::state::SharedState;

/// Coordinator-side experience for one client type.
#[derive(Debug)]
pub struct ServerExperience {
    client_type: String,
    globals: SharedState,
    started: bool,
}

impl ServerExperience {
    pub fn new(client_type: impl Into<String>, globals: SharedState) -> Self {
        Self {
            client_type: client_type.into(),
            globals,
            started: false,
        }
    }

    pub fn client_type(&self) -> &str {
        &self.client_type
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn start(&mut self) {
        self.started = true;
        log::info!(
            "[experience:{}] Started with globals {}",
            self.client_type,
            self.globals.values()
        );
    }
}

/// Peer-side playback experience.
pub struct PlayerExperience {
    index: usize,
    clock: AudioClock,
    sync: Option<Arc<SyncPlugin>>,
    buffers: Option<Arc<AudioBufferLoaderPlugin>>,
    started: bool,
}

impl PlayerExperience {
    pub fn new(index: usize, context: &RuntimeContext, clock: AudioClock) -> Self {
        Self {
            index,
            clock,
            sync: context.plugin::<SyncPlugin>(SYNC),
            buffers: context.plugin::<AudioBufferLoaderPlugin>(AUDIO_BUFFER_LOADER),
            started: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn start(&mut self) {
        self.started = true;
        log::info!("[player:{}] Started {}", self.index, self.status());
    }

    /// Snapshot for display.
    pub fn status(&self) -> serde_json::Value {
        json!({
            "index": self.index,
            "started": self.started,
            "audioTime": self.clock.current_time(),
            "syncTime": self.sync.as_ref().map(|s| s.sync_time()),
            "buffers": self.buffers.as_ref().map(|b| b.ids()).unwrap_or_default(),
        })
    }
}

impl std::fmt::Debug for PlayerExperience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerExperience")
            .field("index", &self.index)
            .field("started", &self.started)
            .finish()
    }
}
