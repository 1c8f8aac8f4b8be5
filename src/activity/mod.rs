//! Activity tracking - idle detection from user input signals
//!
//! This module provides:
//! - ActivitySurface trait and the in-process SignalBus surface
//! - Subscription handles for registered listeners
//! - Coalescer for trailing-edge debouncing of signal bursts
//! - ActivityTracker answering idle / not idle

pub mod coalesce;
pub mod surface;
pub mod tracker;

pub use coalesce::Coalescer;
pub use surface::{ActivitySink, ActivitySurface, SignalBus, Subscription};
pub use tracker::ActivityTracker;
