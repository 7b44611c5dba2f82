//! Cancellable subscriptions to physical unlock signals.
//!
//! A [`SignalSource`] stands for one physical input channel (a touch-end,
//! a mouse-up, a key press). Handlers are registered with
//! [`subscribe`](SignalSource::subscribe) and removed with
//! [`unsubscribe`](SignalSource::unsubscribe). Dispatch runs against a
//! snapshot of the handlers, so a handler may unsubscribe itself or others.

use std::fmt;
use std::io::BufRead;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A human-originated event allowed to unlock audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockEvent {
    /// Physical channel the event came from, e.g. `"touchend"`.
    pub channel: String,
    pub at: DateTime<Utc>,
}

impl UnlockEvent {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            at: Utc::now(),
        }
    }
}

/// Handler invoked on every dispatched event.
pub type SignalHandler = Arc<dyn Fn(&UnlockEvent) + Send + Sync>;

/// Identifies one subscription on one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// One physical signal channel.
pub struct SignalSource {
    channel: String,
    handlers: Mutex<Vec<(SubscriptionToken, SignalHandler)>>,
    next_token: AtomicU64,
}

impl SignalSource {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            handlers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn subscribe(&self, handler: impl Fn(&UnlockEvent) + Send + Sync + 'static) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((token, Arc::new(handler)));
        token
    }

    /// Returns `false` if the token was not subscribed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(t, _)| *t != token);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Emit a fresh event on this channel.
    pub fn emit(&self) -> usize {
        self.dispatch(&UnlockEvent::new(self.channel.clone()))
    }

    /// Deliver `event` to the current subscribers; returns how many were
    /// invoked.
    pub fn dispatch(&self, event: &UnlockEvent) -> usize {
        let snapshot: Vec<SignalHandler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }
}

/// Emit on `source` once per line read from `reader`, on a detached
/// thread, until end of input or a read error. The thread returns the
/// number of lines seen.
///
/// Runs on a plain thread; runtime shutdown does not wait for it.
pub fn spawn_line_feed<R>(reader: R, source: Arc<SignalSource>) -> std::thread::JoinHandle<usize>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || {
        let mut lines = 0;
        for line in reader.lines() {
            if line.is_err() {
                break;
            }
            lines += 1;
            source.emit();
        }
        log::debug!("[signal:{}] Line feed closed after {} line(s)", source.channel, lines);
        lines
    })
}

impl fmt::Debug for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSource")
            .field("channel", &self.channel)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let source = SignalSource::new("mouseup");
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let token = source.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(source.emit(), 1);
        assert!(source.unsubscribe(token));
        assert!(!source.unsubscribe(token));
        assert_eq!(source.emit(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let source = Arc::new(SignalSource::new("touchend"));
        let slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&source);
        let own = slot.clone();
        let token = source.subscribe(move |event| {
            assert_eq!(event.channel, "touchend");
            if let (Some(source), Some(token)) = (weak.upgrade(), *own.lock()) {
                source.unsubscribe(token);
            }
        });
        *slot.lock() = Some(token);

        assert_eq!(source.emit(), 1);
        assert_eq!(source.subscriber_count(), 0);
    }

    /// Blocks on each read until a chunk arrives; end of input once the
    /// sender is dropped.
    struct ChannelReader(std::sync::mpsc::Receiver<Vec<u8>>);

    impl std::io::Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.recv() {
                Ok(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn test_line_feed_emits_per_line() {
        let source = Arc::new(SignalSource::new("keyboard"));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        source.subscribe(move |event| {
            assert_eq!(event.channel, "keyboard");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let feed = spawn_line_feed(std::io::Cursor::new(b"\n\nx\n".to_vec()), source);
        assert_eq!(feed.join().unwrap(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_pending_line_feed_does_not_block_runtime_shutdown() {
        let source = Arc::new(SignalSource::new("keyboard"));
        let (tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let feed = runtime.block_on(async {
            spawn_line_feed(std::io::BufReader::new(ChannelReader(rx)), source.clone())
        });
        // The feed is still blocked on its first read here.
        drop(runtime);
        assert!(!feed.is_finished());

        tx.send(b"\n".to_vec()).unwrap();
        drop(tx);
        assert_eq!(feed.join().unwrap(), 1);
    }
}
