use std::time::Duration;

use serde::Serialize;

/// Receiver-report block of a parsed feedback report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverReportBlock {
    /// Fraction of packets lost since the previous report, in 1/256 units.
    pub fraction_lost: u8,
    pub cumulative_lost: u32,
    /// Extended highest sequence number: cycles in the high 16 bits.
    pub highest_seq: u32,
    pub jitter: Duration,
    /// Middle 32 bits of the NTP time of the last sender report seen.
    pub lsr: u32,
    /// Delay since that sender report, in 1/65536 s.
    pub dlsr: u32,
}

impl ReceiverReportBlock {
    pub fn lost_rate(&self) -> f64 {
        self.fraction_lost as f64 / 256.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OwdBlock {
    pub median: Duration,
    pub min: Duration,
    pub max: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscardedBlock {
    pub bytes: u64,
    pub packets: u64,
}

/// A feedback report parsed by the protocol layer and bound to a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub path_id: u8,
    pub receiver_report: Option<ReceiverReportBlock>,
    pub owd: Option<OwdBlock>,
    pub discarded: Option<DiscardedBlock>,
}

/// Middle 32 bits of an NTP timestamp (16.16 fixed-point seconds) for a time
/// measured on the core's clock.
pub fn ntp_short(time: Duration) -> u32 {
    ((time.as_nanos() << 16) / 1_000_000_000) as u32
}

/// Inverse of [`ntp_short`] for intervals.
pub fn ntp_short_to_duration(units: u32) -> Duration {
    Duration::from_nanos(((units as u128 * 1_000_000_000) >> 16) as u64)
}
