//! Path configuration and constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Horizon of the recent-sent-bytes window feeding the overuse test.
pub(crate) const SENT_BYTES_HORIZON: Duration = Duration::from_secs(1);

/// Item capacity of the recent-sent-bytes window.
pub(crate) const SENT_BYTES_WINDOW_CAPACITY: usize = 1024;

/// Entries kept in the sent-octet ring before the oldest is overwritten.
pub(crate) const SENT_OCTET_RING_SIZE: usize = 32_767;

/// Largest probe payload the path will synthesize (bytes).
pub(crate) const MAX_PROBE_PAYLOAD: usize = 1400;

/// Default bound of the pacing queue.
pub(crate) const DEFAULT_MAX_QUEUED_PACKETS: usize = 4096;

/// Highest dynamic RTP payload type, used for probes unless configured.
pub(crate) const DEFAULT_MONITOR_PAYLOAD_TYPE: u8 = 127;

/// Per-path sending configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PathConfig {
    /// Pacing ceiling in bytes per second. 0 disables pacing.
    pub max_bytes_per_second: u32,
    /// Emit a probe after every N normal packets. 0 disables probing.
    pub monitoring_interval: u32,
    /// Payload type stamped on probe packets.
    pub monitor_payload_type: u8,
    /// Probe payload size in bytes, capped at 1400.
    pub probe_payload_size: usize,
    /// Packets held while overused before the oldest is dropped.
    pub max_queued_packets: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            max_bytes_per_second: 0,          // no pacing
            monitoring_interval: 0,           // no probes
            monitor_payload_type: DEFAULT_MONITOR_PAYLOAD_TYPE,
            probe_payload_size: MAX_PROBE_PAYLOAD,
            max_queued_packets: DEFAULT_MAX_QUEUED_PACKETS,
        }
    }
}
