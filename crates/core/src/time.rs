//! Time abstraction for the congestion core.
//!
//! This module provides:
//! - `TimeSource` trait for reading a monotonic clock
//! - `RealTime` implementation backed by `std::time::Instant`
//! - `VirtualTime` implementation for deterministic tests and simulation
//!
//! Every stateful component takes its clock at construction, so windows, paths
//! and trackers never consult a process-wide clock.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Abstraction over the clock used by windows, paths and trackers.
pub trait TimeSource: Send + Sync + Clone + 'static {
    /// Returns the current time as nanoseconds since an arbitrary epoch.
    fn now_nanos(&self) -> u64;

    /// Returns the current time as a Duration since an arbitrary epoch.
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos())
    }
}

/// Monotonic wall-clock time.
#[derive(Clone, Debug)]
pub struct RealTime {
    epoch: std::time::Instant,
}

impl Default for RealTime {
    fn default() -> Self {
        Self::new()
    }
}

impl RealTime {
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl TimeSource for RealTime {
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Virtual time for deterministic tests.
///
/// Time only advances when explicitly stepped via `advance()` or `advance_to()`.
/// Clones share the same underlying clock, so a test can keep one handle and
/// hand another to the component under test.
#[derive(Clone, Debug)]
pub struct VirtualTime {
    current_nanos: Arc<AtomicU64>,
}

impl Default for VirtualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTime {
    /// Creates a new virtual time starting at 0.
    pub fn new() -> Self {
        Self::with_initial_time(0)
    }

    /// Creates a new virtual time starting at the given nanoseconds.
    pub fn with_initial_time(initial_nanos: u64) -> Self {
        Self {
            current_nanos: Arc::new(AtomicU64::new(initial_nanos)),
        }
    }

    /// Advances time by the given duration.
    pub fn advance(&self, duration: Duration) {
        self.current_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Advances time to the given absolute nanoseconds.
    ///
    /// Moving backwards is ignored; the clock is monotonic.
    pub fn advance_to(&self, target_nanos: u64) {
        self.current_nanos.fetch_max(target_nanos, Ordering::SeqCst);
    }
}

impl TimeSource for VirtualTime {
    fn now_nanos(&self) -> u64 {
        self.current_nanos.load(Ordering::SeqCst)
    }
}
