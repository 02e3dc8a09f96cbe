//! Per-network-path sender.
//!
//! A [`Path`] assigns subflow sequence numbers, paces outbound packets
//! against a bytes-per-second ceiling and carries the state bits the rate
//! controller and report processor act on.
//!
//! ## Send path
//!
//! ```text
//! send(packet) ─► refresh 1s window ─► overused? ──yes──► queue (drop-oldest)
//!                                         │no
//!                                         ▼
//!                                   queue empty? ──no──► queue + flush
//!                                         │yes
//!                                         ▼
//!                                     transmit
//! ```
//!
//! Flushing stops as soon as the path becomes overused again, so a tick can
//! drain the queue only partially.
//!
//! ## State
//!
//! | Bit | Set | Clear |
//! |-----|-----|-------|
//! | `ACTIVE` | active | passive |
//! | `NON_CONGESTED` | non-congested | congested |
//! | `NON_LOSSY` | non-lossy | lossy |
//! | `TRIAL` | in trial | - |
//!
//! The composite [`PathState`] takes the highest priority clear bit:
//! passive, then congested, then lossy.

mod config;
mod controller;
mod packet;
mod state;
mod stats;

#[cfg(test)]
mod tests;

pub use config::PathConfig;
pub use controller::Path;
pub use packet::{OutboundPacket, PacketKind, PacketSender, SubflowPacket};
pub use state::{PathFlags, PathState, StateTransitions};
pub use stats::PathStats;
