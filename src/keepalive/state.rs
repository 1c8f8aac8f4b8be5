//! Lifecycle states of the keep-alive loop.

use std::fmt;

/// `Idle` until started, `Running` once the token is held, then exactly one
/// terminal state. Terminal states are final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    /// User went idle, or an administrative stop
    StoppedIdle,
    StoppedFailed { reason: String },
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::StoppedIdle | LoopState::StoppedFailed { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, LoopState::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoopState::StoppedFailed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::StoppedIdle => "stopped-idle",
            LoopState::StoppedFailed { .. } => "stopped-failed",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::StoppedFailed { reason } => write!(f, "{}: {}", self.label(), reason),
            _ => f.write_str(self.label()),
        }
    }
}
