//! Audio buffer loader plugin.
//!
//! Reads the declared audio files into memory during init. Decoding is left
//! to the playback side.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::plugins::{Dependencies, Plugin, PluginContext};

#[derive(Debug, Clone, Default)]
pub struct AudioBufferLoaderOptions {
    /// Root the file paths are relative to.
    pub base_dir: PathBuf,
    /// Buffer id -> file path.
    pub data: BTreeMap<String, String>,
}

pub struct AudioBufferLoaderPlugin {
    options: AudioBufferLoaderOptions,
    buffers: RwLock<BTreeMap<String, Bytes>>,
}

impl AudioBufferLoaderPlugin {
    pub fn new(options: AudioBufferLoaderOptions, _deps: &Dependencies) -> anyhow::Result<Self> {
        Ok(Self {
            options,
            buffers: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn get(&self, id: &str) -> Option<Bytes> {
        self.buffers.read().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.buffers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.read().is_empty()
    }
}

#[async_trait]
impl Plugin for AudioBufferLoaderPlugin {
    async fn init(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        let mut loaded = BTreeMap::new();
        for (id, path) in &self.options.data {
            let full = self.options.base_dir.join(path);
            let data = tokio::fs::read(&full)
                .await
                .with_context(|| format!("failed to load buffer '{}' from {}", id, full.display()))?;
            log::debug!("[{}] Loaded '{}' ({} bytes)", ctx.name(), id, data.len());
            loaded.insert(id.clone(), Bytes::from(data));
        }
        *self.buffers.write() = loaded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{LifecycleOrchestrator, PluginError, RunConfig, RuntimeContext};

    fn options(dir: &std::path::Path, files: &[(&str, &str)]) -> AudioBufferLoaderOptions {
        AudioBufferLoaderOptions {
            base_dir: dir.to_path_buf(),
            data: files
                .iter()
                .map(|(id, path)| (id.to_string(), path.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_loads_declared_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sounds")).unwrap();
        std::fs::write(dir.path().join("sounds/a.mp3"), b"abc").unwrap();

        let ctx = RuntimeContext::new("peer");
        ctx.register(
            "audio-buffer-loader",
            AudioBufferLoaderPlugin::new,
            options(dir.path(), &[("1", "sounds/a.mp3")]),
            &[],
        )
        .unwrap();
        LifecycleOrchestrator::default()
            .run(&ctx, &RunConfig::default())
            .await
            .unwrap();

        let loader = ctx
            .plugin::<AudioBufferLoaderPlugin>("audio-buffer-loader")
            .unwrap();
        assert_eq!(loader.ids(), vec!["1"]);
        assert_eq!(loader.get("1").unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_missing_file_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RuntimeContext::new("peer");
        ctx.register(
            "audio-buffer-loader",
            AudioBufferLoaderPlugin::new,
            options(dir.path(), &[("1", "sounds/missing.mp3")]),
            &[],
        )
        .unwrap();

        let err = LifecycleOrchestrator::default()
            .run(&ctx, &RunConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::CapabilityInitFailure { .. }));
        assert!(err.to_string().contains("missing.mp3"));
    }
}
