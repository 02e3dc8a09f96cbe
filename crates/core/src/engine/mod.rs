//! The congestion core: paths, distributor, tracking and feedback behind one
//! handle, ticked periodically.
//!
//! ```text
//!            send(id, packet)                 receive_report / receive_utilization
//!                  │                                        │
//!                  ▼                                        ▼
//!  ┌───────────────────────────┐    targets    ┌──────────────────────┐
//!  │ Path (pacing, probes, seq)│ ◀──────────── │ RateDistributor      │
//!  └─────────────┬─────────────┘               └──────────▲───────────┘
//!                │ SubflowPacket                          │ tick()
//!                ▼                                        │
//!  ┌───────────────────────────┐               ┌──────────┴───────────┐
//!  │ SendTracker → PacketSender│               │ Ticker (tokio task)  │
//!  └───────────────────────────┘               └──────────────────────┘
//! ```
//!
//! Each tick, in order: every path evicts stale sent-byte samples and flushes
//! what its pacing budget allows, the send tracker drops samples older than
//! one second, the distributor runs a round and the committed targets are
//! written to the paths (optionally as pacing limits with headroom), and
//! receiver reports are produced once the report interval has elapsed.

mod controller;
mod ticker;


pub use controller::{CongestionCore, CoreStats};
pub use ticker::TickerHandle;
