//! One shared unlock control for several co-resident peers.
//!
//! When a process hosts K >= 2 emulated peers, each would otherwise need
//! its own user gesture. The coordinator here subscribes once to every
//! physical signal source and forwards the first gesture to every tracked
//! peer, then detaches from all sources.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::peer::PeerHandle;
use crate::signal::{SignalSource, SubscriptionToken, UnlockEvent};

#[derive(Default)]
struct FanOutState {
    peers: Vec<PeerHandle>,
    fired: bool,
    subscriptions: Vec<(Arc<SignalSource>, SubscriptionToken)>,
}

/// Forwards the first unlock signal to every tracked peer.
#[derive(Clone)]
pub struct FanOutCoordinator {
    state: Arc<Mutex<FanOutState>>,
}

impl FanOutCoordinator {
    /// `None` below two peers; a single peer handles its own unlock.
    pub fn for_peer_count(count: usize) -> Option<Self> {
        (count >= 2).then(|| Self {
            state: Arc::new(Mutex::new(FanOutState::default())),
        })
    }

    /// Track a peer. Refused once the coordinator has fired.
    pub fn track(&self, peer: PeerHandle) -> bool {
        let mut state = self.state.lock();
        if state.fired {
            log::warn!(
                "[fanout] Peer {} tracked after unlock; it must unlock on its own",
                peer.index()
            );
            return false;
        }
        state.peers.push(peer);
        true
    }

    /// Subscribe to every source. Returns how many subscriptions were added.
    pub fn bind(&self, sources: &[Arc<SignalSource>]) -> usize {
        let mut state = self.state.lock();
        if state.fired {
            return 0;
        }
        for source in sources {
            let weak: Weak<Mutex<FanOutState>> = Arc::downgrade(&self.state);
            let token = source.subscribe(move |event| {
                if let Some(state) = weak.upgrade() {
                    fire(&state, event);
                }
            });
            state.subscriptions.push((source.clone(), token));
        }
        log::debug!(
            "[fanout] Bound to {} source(s) for {} peer(s)",
            sources.len(),
            state.peers.len()
        );
        sources.len()
    }

    pub fn fired(&self) -> bool {
        self.state.lock().fired
    }

    /// Number of tracked peers.
    pub fn tracked(&self) -> usize {
        self.state.lock().peers.len()
    }
}

fn fire(state: &Mutex<FanOutState>, event: &UnlockEvent) {
    let mut state = state.lock();
    if state.fired {
        return;
    }
    state.fired = true;

    for (source, token) in state.subscriptions.drain(..) {
        source.unsubscribe(token);
    }

    let delivered = state
        .peers
        .iter()
        .filter(|peer| peer.deliver_unlock_signal(event))
        .count();
    log::info!(
        "[fanout] '{}' unlocked {}/{} peer(s)",
        event.channel,
        delivered,
        state.peers.len()
    );
}

impl std::fmt::Debug for FanOutCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FanOutCoordinator")
            .field("peers", &state.peers.len())
            .field("fired", &state.fired)
            .field("subscriptions", &state.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::UnlockGate;

    fn peers(count: usize) -> Vec<(PeerHandle, UnlockGate)> {
        (0..count)
            .map(|index| {
                let gate = UnlockGate::new();
                (PeerHandle::new(index, Some(gate.clone())), gate)
            })
            .collect()
    }

    #[test]
    fn test_single_peer_gets_no_coordinator() {
        assert!(FanOutCoordinator::for_peer_count(0).is_none());
        assert!(FanOutCoordinator::for_peer_count(1).is_none());
        assert!(FanOutCoordinator::for_peer_count(2).is_some());
    }

    #[test]
    fn test_first_signal_unlocks_every_peer_once() {
        let fanout = FanOutCoordinator::for_peer_count(3).unwrap();
        let peers = peers(3);
        for (handle, _) in &peers {
            assert!(fanout.track(handle.clone()));
        }

        let touchend = Arc::new(SignalSource::new("touchend"));
        let mouseup = Arc::new(SignalSource::new("mouseup"));
        assert_eq!(fanout.bind(&[touchend.clone(), mouseup.clone()]), 2);
        assert!(!fanout.fired());

        assert_eq!(touchend.emit(), 1);
        assert!(fanout.fired());
        for (_, gate) in &peers {
            assert_eq!(gate.event().unwrap().channel, "touchend");
        }

        assert_eq!(touchend.subscriber_count(), 0);
        assert_eq!(mouseup.subscriber_count(), 0);
        assert_eq!(mouseup.emit(), 0);
        for (_, gate) in &peers {
            assert_eq!(gate.event().unwrap().channel, "touchend");
        }
    }

    #[test]
    fn test_late_peer_is_refused() {
        let fanout = FanOutCoordinator::for_peer_count(2).unwrap();
        let mut peers = peers(3);
        let (late, late_gate) = peers.pop().unwrap();
        for (handle, _) in &peers {
            fanout.track(handle.clone());
        }

        let source = Arc::new(SignalSource::new("mouseup"));
        fanout.bind(&[source.clone()]);
        source.emit();

        assert!(!fanout.track(late));
        assert_eq!(fanout.tracked(), 2);
        assert!(!late_gate.is_open());
        assert_eq!(fanout.bind(&[source]), 0);
    }

    #[test]
    fn test_concurrent_signals_broadcast_once() {
        let fanout = FanOutCoordinator::for_peer_count(4).unwrap();
        let peers = peers(4);
        for (handle, _) in &peers {
            fanout.track(handle.clone());
        }
        let sources: Vec<Arc<SignalSource>> = ["touchend", "mouseup", "keydown", "click"]
            .into_iter()
            .map(|channel| Arc::new(SignalSource::new(channel)))
            .collect();
        fanout.bind(&sources);

        let barrier = Arc::new(std::sync::Barrier::new(sources.len()));
        let threads: Vec<_> = sources
            .iter()
            .cloned()
            .map(|source| {
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    source.emit();
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert!(fanout.fired());
        let first = peers[0].1.event().unwrap();
        for (_, gate) in &peers {
            assert_eq!(gate.event().unwrap(), first);
        }
        assert!(sources.iter().all(|s| s.subscriber_count() == 0));
    }
}
