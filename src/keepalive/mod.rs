//! Keep-alive loop - periodic heartbeats while the user is active
//!
//! This module provides:
//! - LoopState lifecycle
//! - KeepAlive, the scheduler that gates heartbeats on activity

pub mod scheduler;
pub mod state;

pub use scheduler::KeepAlive;
pub use state::LoopState;
