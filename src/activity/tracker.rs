//! Idle detection from observed activity signals.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::activity::coalesce::Coalescer;
use crate::activity::surface::{ActivitySurface, Subscription};
use crate::config::ActivityConfig;
use crate::error::{HeartwatchError, Result};

/// Time of the last coalesced activity. Only moves forward.
#[derive(Debug)]
struct ActivityState {
    last_activity: Instant,
    updates: u64,
}

impl ActivityState {
    fn record(&mut self, at: Instant) {
        if at > self.last_activity {
            self.last_activity = at;
        }
        self.updates += 1;
    }
}

#[derive(Default)]
struct Observation {
    subscriptions: Vec<Subscription>,
    flushers: Vec<JoinHandle<()>>,
}

/// Answers "has the user been idle for longer than the threshold".
pub struct ActivityTracker {
    surface: Arc<dyn ActivitySurface>,
    signals: Vec<String>,
    idle_threshold: Duration,
    coalesce_window: Duration,
    state: Arc<Mutex<ActivityState>>,
    observation: Mutex<Observation>,
}

impl ActivityTracker {
    /// Create a tracker. The clock starts at construction time.
    pub fn new(
        surface: Arc<dyn ActivitySurface>,
        signals: Vec<String>,
        idle_threshold: Duration,
        coalesce_window: Duration,
    ) -> Result<Self> {
        if idle_threshold.is_zero() {
            return Err(HeartwatchError::Config("idle threshold must be positive".to_string()));
        }
        if coalesce_window.is_zero() {
            return Err(HeartwatchError::Config("coalesce window must be positive".to_string()));
        }

        Ok(Self {
            surface,
            signals,
            idle_threshold,
            coalesce_window,
            state: Arc::new(Mutex::new(ActivityState {
                last_activity: Instant::now(),
                updates: 0,
            })),
            observation: Mutex::new(Observation::default()),
        })
    }

    pub fn from_config(
        surface: Arc<dyn ActivitySurface>,
        config: &ActivityConfig,
        idle_threshold: Duration,
    ) -> Result<Self> {
        Self::new(surface, config.signals.clone(), idle_threshold, config.coalesce_window())
    }

    /// Register a listener for each configured signal and begin observing.
    ///
    /// Must run inside a tokio runtime. Call at most once before `stop`;
    /// a second call registers every listener again.
    pub fn start(&self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut observation = self.observation.lock().unwrap_or_else(|e| e.into_inner());

        for signal in &self.signals {
            observation.subscriptions.push(self.surface.listen(signal, tx.clone()));
        }
        drop(tx);

        let coalescer = Coalescer::new(self.coalesce_window);
        observation
            .flushers
            .push(tokio::spawn(flush_loop(rx, coalescer, Arc::clone(&self.state))));

        tracing::debug!(signals = ?self.signals, "Activity tracker started");
    }

    /// Deregister every listener. The last activity time is frozen afterwards.
    pub fn stop(&self) {
        let mut observation = self.observation.lock().unwrap_or_else(|e| e.into_inner());
        if observation.subscriptions.is_empty() && observation.flushers.is_empty() {
            return;
        }

        for flusher in observation.flushers.drain(..) {
            flusher.abort();
        }
        let released = observation.subscriptions.len();
        for subscription in observation.subscriptions.drain(..) {
            subscription.release();
        }

        tracing::debug!(released, "Activity tracker stopped");
    }

    pub fn is_observing(&self) -> bool {
        !self.observation.lock().unwrap_or_else(|e| e.into_inner()).subscriptions.is_empty()
    }

    /// True once strictly more than the idle threshold has passed since the last activity.
    pub fn is_idle(&self) -> bool {
        self.idle_for() > self.idle_threshold
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }

    pub fn last_activity(&self) -> Instant {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).last_activity
    }

    /// Number of coalesced updates applied so far.
    pub fn updates(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).updates
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }
}

impl Drop for ActivityTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn flush_loop(
    mut rx: mpsc::UnboundedReceiver<Instant>,
    mut coalescer: Coalescer,
    state: Arc<Mutex<ActivityState>>,
) {
    loop {
        let deadline = coalescer.deadline();
        tokio::select! {
            received = rx.recv() => match received {
                Some(at) => coalescer.record(at),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(at) = coalescer.flush_due(Instant::now()) {
                    state.lock().unwrap_or_else(|e| e.into_inner()).record(at);
                    tracing::debug!("Activity recorded");
                }
            }
        }
    }
    coalescer.discard();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::surface::SignalBus;
    use tokio::time::sleep;

    const WINDOW: Duration = Duration::from_millis(500);

    fn tracker(bus: &SignalBus, threshold: Duration) -> ActivityTracker {
        ActivityTracker::new(
            Arc::new(bus.clone()),
            vec!["click".to_string(), "keydown".to_string(), "mousemove".to_string()],
            threshold,
            WINDOW,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let bus = SignalBus::new();
        let result = ActivityTracker::new(Arc::new(bus), vec!["click".to_string()], Duration::ZERO, WINDOW);
        assert!(matches!(result, Err(HeartwatchError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_registers_one_listener_per_signal() {
        let bus = SignalBus::new();
        let t = tracker(&bus, Duration::from_secs(60));
        assert!(!t.is_observing());

        t.start();
        assert_eq!(bus.listener_count(), 3);
        assert!(t.is_observing());

        t.stop();
        assert_eq!(bus.listener_count(), 0);
        assert!(!t.is_observing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_after_threshold_without_signals() {
        let bus = SignalBus::new();
        let t = tracker(&bus, Duration::from_secs(10));
        t.start();

        sleep(Duration::from_secs(10)).await;
        // Exactly at the threshold is not idle yet
        assert!(!t.is_idle());

        sleep(Duration::from_millis(1)).await;
        assert!(t.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_produces_single_update_at_last_signal() {
        let bus = SignalBus::new();
        let t = tracker(&bus, Duration::from_secs(60));
        t.start();

        for _ in 0..4 {
            bus.emit("mousemove");
            sleep(Duration::from_millis(100)).await;
        }
        bus.emit("keydown");
        let last_signal = Instant::now();

        sleep(Duration::from_millis(499)).await;
        assert_eq!(t.updates(), 0);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(t.updates(), 1);
        assert_eq!(t.last_activity(), last_signal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_idle_clock() {
        let bus = SignalBus::new();
        let t = tracker(&bus, Duration::from_secs(5));
        t.start();

        sleep(Duration::from_secs(4)).await;
        bus.emit("click");
        sleep(Duration::from_secs(4)).await;
        // 8s since start, 4s since the click
        assert!(!t.is_idle());

        sleep(Duration::from_millis(1001)).await;
        assert!(t.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_signal_ignored() {
        let bus = SignalBus::new();
        let t = tracker(&bus, Duration::from_secs(60));
        t.start();

        assert_eq!(bus.emit("scroll"), 0);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(t.updates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_freezes_last_activity() {
        let bus = SignalBus::new();
        let t = tracker(&bus, Duration::from_secs(60));
        t.start();

        bus.emit("click");
        sleep(Duration::from_secs(1)).await;
        let frozen = t.last_activity();
        assert_eq!(t.updates(), 1);

        // Pending signal inside the window is discarded by stop
        bus.emit("click");
        t.stop();
        assert_eq!(bus.emit("click"), 0);
        sleep(Duration::from_secs(2)).await;

        assert_eq!(t.last_activity(), frozen);
        assert_eq!(t.updates(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let bus = SignalBus::new();
        let t = tracker(&bus, Duration::from_secs(60));
        t.start();
        t.stop();
        t.stop();
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_double_registers() {
        let bus = SignalBus::new();
        let t = tracker(&bus, Duration::from_secs(60));
        t.start();
        t.start();
        assert_eq!(bus.listener_count(), 6);
        t.stop();
        assert_eq!(bus.listener_count(), 0);
    }
}
