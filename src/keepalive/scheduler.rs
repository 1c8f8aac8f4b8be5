//! Keep-alive scheduler - activity-gated heartbeat loop
//!
//! Lifecycle:
//! 1. Start observing activity
//! 2. Wait for the host to be ready, then acquire the token once
//! 3. Every poll period: stop if the user is idle, otherwise heartbeat
//!    through the retry policy and stop if every attempt fails
//!
//! A tick runs to completion before the next one is taken, so a slow retry
//! sequence delays the following tick rather than overlapping it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::activity::ActivityTracker;
use crate::config::KeepAliveConfig;
use crate::error::{HeartwatchError, Result};
use crate::heartbeat::HeartbeatClient;
use crate::keepalive::state::LoopState;
use crate::readiness::{Immediate, ReadinessSignal};
use crate::retry::RetryPolicy;
use crate::token::{Credential, TokenProvider};

pub struct KeepAlive {
    poll_period: Duration,
    retry: RetryPolicy,
    tracker: Arc<ActivityTracker>,
    tokens: Arc<dyn TokenProvider>,
    heartbeat: Arc<dyn HeartbeatClient>,
    readiness: Arc<dyn ReadinessSignal>,
    state: watch::Sender<LoopState>,
    ticks: AtomicU64,
    heartbeats_sent: AtomicU64,
}

impl KeepAlive {
    pub fn new(
        config: &KeepAliveConfig,
        tracker: Arc<ActivityTracker>,
        tokens: Arc<dyn TokenProvider>,
        heartbeat: Arc<dyn HeartbeatClient>,
    ) -> Result<Self> {
        if config.poll_period_ms == 0 {
            return Err(HeartwatchError::Config("poll_period_ms must be positive".to_string()));
        }
        let retry = RetryPolicy::new(config.retry_attempts, config.retry_delay())?;
        let (state, _) = watch::channel(LoopState::Idle);

        Ok(Self {
            poll_period: config.poll_period(),
            retry,
            tracker,
            tokens,
            heartbeat,
            readiness: Arc::new(Immediate),
            state,
            ticks: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
        })
    }

    /// Wait on `readiness` before acquiring the token
    pub fn with_readiness(mut self, readiness: Arc<dyn ReadinessSignal>) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state.borrow().clone()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Ticks taken while running
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Heartbeat sequences that ended in success
    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent.load(Ordering::SeqCst)
    }

    pub fn tracker(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }

    /// Spawn [`KeepAlive::run`] on the current runtime.
    ///
    /// Call at most once per instance.
    pub fn start(self: &Arc<Self>) -> JoinHandle<LoopState> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }

    /// Drive the loop until it reaches a terminal state and return that state.
    pub async fn run(&self) -> LoopState {
        if self.state().is_terminal() {
            return self.state();
        }

        tracing::info!(
            poll_period_ms = self.poll_period.as_millis() as u64,
            idle_threshold_ms = self.tracker.idle_threshold().as_millis() as u64,
            retry_attempts = self.retry.max_attempts(),
            "Starting keep-alive"
        );
        self.tracker.start();
        if self.state().is_terminal() {
            // Stopped while the tracker was being registered
            self.tracker.stop();
            return self.state();
        }

        let acquired = tokio::select! {
            acquired = self.acquire() => acquired,
            _ = self.stopped() => return self.state(),
        };
        let token = match acquired {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "Token acquisition failed, keep-alive not started");
                self.finish(LoopState::StoppedFailed { reason: e.to_string() });
                return self.state();
            }
        };

        let entered = self.state.send_if_modified(|state| {
            if *state == LoopState::Idle {
                *state = LoopState::Running;
                true
            } else {
                false
            }
        });
        if !entered {
            return self.state();
        }
        tracing::info!("Keep-alive running");

        let mut interval = tokio::time::interval_at(Instant::now() + self.poll_period, self.poll_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.stopped() => break,
            }

            let outcome = tokio::select! {
                outcome = self.check_tick(&token) => outcome,
                _ = self.stopped() => break,
            };
            if let Some(terminal) = outcome {
                self.finish(terminal);
                break;
            }
        }

        self.state()
    }

    /// Administrative stop. A no-op once the loop is terminal.
    pub fn stop(&self) {
        if self.finish(LoopState::StoppedIdle) {
            tracing::info!("Keep-alive stopped on request");
        }
    }

    async fn acquire(&self) -> Result<Credential> {
        self.readiness.wait_ready().await;
        tracing::debug!("Host ready, acquiring token");
        self.tokens.acquire_token().await
    }

    /// One poll. Returns the terminal state to move to, if any.
    async fn check_tick(&self, token: &Credential) -> Option<LoopState> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let idle_for = self.tracker.idle_for();
        tracing::debug!(tick, idle_for_ms = idle_for.as_millis() as u64, "Keep-alive tick");

        if self.tracker.is_idle() {
            tracing::info!(idle_for_secs = idle_for.as_secs(), "User is idle, stopping keep-alive");
            return Some(LoopState::StoppedIdle);
        }

        match self.retry.run(|| self.heartbeat.beat(token)).await {
            Ok(()) => {
                self.heartbeats_sent.fetch_add(1, Ordering::SeqCst);
                None
            }
            Err(exhausted) => {
                let err = HeartwatchError::from(exhausted);
                tracing::error!(error = %err, "Heartbeat failed, stopping keep-alive");
                Some(LoopState::StoppedFailed { reason: err.to_string() })
            }
        }
    }

    /// Move to `terminal` unless already terminal, releasing the tracker once.
    fn finish(&self, terminal: LoopState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = terminal;
                true
            }
        });
        if moved {
            self.tracker.stop();
            tracing::info!(state = %self.state(), "Keep-alive finished");
        }
        moved
    }

    async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(LoopState::is_terminal).await;
    }
}
