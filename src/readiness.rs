//! Host readiness - a one-shot notification awaited before startup work

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

#[async_trait]
pub trait ReadinessSignal: Send + Sync {
    /// Resolve once the host is ready. Resolves immediately after that.
    async fn wait_ready(&self);
}

/// Host that is ready from the start
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

#[async_trait]
impl ReadinessSignal for Immediate {
    async fn wait_ready(&self) {}
}

/// One-shot latch fired by the host adapter
#[derive(Debug, Clone, Default)]
pub struct ReadyLatch {
    fired: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ReadyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!("Host ready");
        }
        self.notify.notify_waiters();
    }

    pub fn is_ready(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessSignal for ReadyLatch {
    async fn wait_ready(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }
}
