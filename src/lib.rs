//! Heartwatch - activity-gated keep-alive heartbeats
//!
//! Heartwatch keeps a remote session alive while a user is actively working:
//! it watches user input signals, and for as long as the user is not idle it
//! periodically sends an authenticated heartbeat, retrying transient failures
//! with a fixed backoff. It stops on idleness, on exhausted retries, or on
//! request.

pub mod activity;
pub mod autosave;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod keepalive;
pub mod readiness;
pub mod retry;
pub mod token;

#[cfg(test)]
mod test_utils;

pub use activity::{ActivitySurface, ActivityTracker, SignalBus};
pub use config::Config;
pub use error::{HeartwatchError, Result};
pub use keepalive::{KeepAlive, LoopState};
pub use retry::RetryPolicy;
