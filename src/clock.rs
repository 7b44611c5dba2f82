//! Audio clock owned by a peer bootstrap.
//!
//! Mirrors an audio context's `currentTime`: it reads `0.0` and stays frozen
//! until resumed, which requires a user gesture on most platforms.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ClockState {
    accumulated: Duration,
    resumed_at: Option<Instant>,
}

/// Shared handle to one audio clock.
#[derive(Debug, Clone, Default)]
pub struct AudioClock {
    state: Arc<Mutex<ClockState>>,
}

impl AudioClock {
    /// A suspended clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds elapsed while running.
    pub fn current_time(&self) -> f64 {
        let state = self.state.lock();
        let running = state.resumed_at.map(|t| t.elapsed()).unwrap_or_default();
        (state.accumulated + running).as_secs_f64()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().resumed_at.is_some()
    }

    /// Returns `false` if the clock was already running.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if state.resumed_at.is_some() {
            return false;
        }
        state.resumed_at = Some(Instant::now());
        true
    }

    /// Returns `false` if the clock was already suspended.
    pub fn suspend(&self) -> bool {
        let mut state = self.state.lock();
        match state.resumed_at.take() {
            Some(since) => {
                state.accumulated += since.elapsed();
                true
            }
            None => false,
        }
    }
}
