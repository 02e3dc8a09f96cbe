/// Core configuration loaded from TOML or JSON.
pub mod config;

/// Periodic reallocation of the aggregate bitrate across controlled paths.
pub mod distributor;

/// The congestion core and its ticker.
mod engine;
pub use engine::{CongestionCore, CoreStats, TickerHandle};

pub mod errors;
pub use errors::{CongestionError, Result};

/// Generation-checked packet lifetimes.
pub mod packets;

/// Per-path sending state machine: pacing, probing, sequencing.
pub mod path;

/// Receiver reports and their processing on the sending side.
pub mod report;

/// Sliding windows and the statistics plugins attached to them.
pub mod stats;

pub mod time;

/// Bytes in flight and recent throughput per path.
pub mod tracker;
