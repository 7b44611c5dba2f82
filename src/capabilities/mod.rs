//! Capabilities registered as plugins by the coordinator and the peers.
//!
//! These sit at the edge of the system: the orchestrator only sees them
//! through the [`Plugin`](crate::plugins::Plugin) trait.
//!
//! | Name                  | Coordinator | Peer                             |
//! |-----------------------|-------------|----------------------------------|
//! | `platform`            | no features | `web-audio`, gated on unlock     |
//! | `sync`                | monotonic   | audio clock, after `platform`    |
//! | `audio-buffer-loader` | no files    | declared audio files             |

pub mod audio_buffer_loader;
pub mod platform;
pub mod sync;

pub use audio_buffer_loader::{AudioBufferLoaderOptions, AudioBufferLoaderPlugin};
pub use platform::{PlatformFeature, PlatformOptions, PlatformPlugin, UnlockGate};
pub use sync::{SyncOptions, SyncPlugin, TimeFn};

/// Registered plugin names.
pub const PLATFORM: &str = "platform";
pub const SYNC: &str = "sync";
pub const AUDIO_BUFFER_LOADER: &str = "audio-buffer-loader";
