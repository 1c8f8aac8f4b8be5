//! Activity surfaces and the subscriptions registered on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Channel a surface delivers signal timestamps into.
pub type ActivitySink = mpsc::UnboundedSender<Instant>;

/// Something user input can be observed on.
pub trait ActivitySurface: Send + Sync {
    /// Register `sink` for every occurrence of `signal`.
    fn listen(&self, signal: &str, sink: ActivitySink) -> Subscription;
}

/// Handle for one registered listener. Releasing or dropping it deregisters.
pub struct Subscription {
    signal: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(signal: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            signal: signal.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn signal(&self) -> &str {
        &self.signal
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("signal", &self.signal)
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: HashMap<u64, (String, ActivitySink)>,
}

/// In-process surface: whoever owns the bus emits named signals into it.
#[derive(Clone, Default)]
pub struct SignalBus {
    inner: Arc<Mutex<BusInner>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `signal` to its listeners, returning how many received it.
    pub fn emit(&self, signal: &str) -> usize {
        let at = Instant::now();
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .listeners
            .values()
            .filter(|(name, _)| name == signal)
            .filter(|(_, sink)| sink.send(at).is_ok())
            .count()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).listeners.len()
    }
}

impl ActivitySurface for SignalBus {
    fn listen(&self, signal: &str, sink: ActivitySink) -> Subscription {
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.insert(id, (signal.to_string(), sink));
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(signal, move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().unwrap_or_else(|e| e.into_inner()).listeners.remove(&id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_matching_listeners_only() {
        let bus = SignalBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _keys = bus.listen("keydown", tx.clone());
        let _clicks = bus.listen("click", tx);

        assert_eq!(bus.emit("keydown"), 1);
        assert_eq!(bus.emit("scroll"), 0);
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_release_deregisters() {
        let bus = SignalBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let sub = bus.listen("click", tx);
        assert_eq!(bus.listener_count(), 1);
        assert_eq!(sub.signal(), "click");

        sub.release();
        assert_eq!(bus.listener_count(), 0);
        assert_eq!(bus.emit("click"), 0);
    }

    #[test]
    fn test_drop_deregisters() {
        let bus = SignalBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        {
            let _sub = bus.listen("mousemove", tx);
            assert_eq!(bus.listener_count(), 1);
        }
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_double_listen_registers_twice() {
        let bus = SignalBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let _a = bus.listen("click", tx.clone());
        let _b = bus.listen("click", tx);
        assert_eq!(bus.listener_count(), 2);
        assert_eq!(bus.emit("click"), 2);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sub = {
            let bus = SignalBus::new();
            bus.listen("click", tx)
        };
        // Bus is gone; releasing must not panic
        sub.release();
    }
}
