//! Path statistics snapshot.

use serde::Serialize;

use super::state::{PathFlags, PathState, StateTransitions};

/// Snapshot of a path for telemetry and debugging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStats {
    pub id: u8,
    pub state: PathState,
    pub flags: PathFlags,
    pub transitions: StateTransitions,
    /// Pacing ceiling (bytes/second), `None` when pacing is off.
    pub max_bytes_per_second: Option<u32>,
    /// Committed sending target (bytes/second).
    pub sending_target: i64,
    pub seq: u16,
    pub cycle_num: u16,
    pub highest_sent_seq: u16,
    /// Total packets handed to the sender, probes included.
    pub total_sent_packets: u64,
    pub total_sent_normal_packets: u64,
    pub total_sent_probe_packets: u64,
    pub total_sent_payload_bytes: u64,
    pub total_sent_frames: u64,
    /// Packets dropped because the pacing queue was full.
    pub dropped_packets: u64,
    pub queued_packets: usize,
    /// Bytes sent over the last second.
    pub sent_bytes_in_1s: u64,
    pub last_sent_at: Option<u64>,
}
