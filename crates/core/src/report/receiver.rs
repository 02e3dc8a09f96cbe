//! Receive-side statistics of one subflow.

use std::time::Duration;

use serde::Serialize;

use super::config::ReceiverConfig;
use super::summary::{DiscardedBlock, OwdBlock, ReceiverReportBlock, ReportSummary};
use crate::stats::{LatestValue, Percentile, PercentileStats, SlidingWindow};
use crate::time::{RealTime, TimeSource};

/// Half of the sequence space; a forward step at least this big is a late packet.
const SEQ_HALF_RANGE: u16 = 0x8000;

/// A feedback report produced on the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiverReport {
    pub path_id: u8,
    pub fraction_lost: u8,
    pub cumulative_lost: u32,
    pub ext_highest_seq: u32,
    pub jitter: Duration,
    pub owd: Option<OwdBlock>,
    /// Cumulative discards, present only when they changed since the last report.
    pub discarded: Option<DiscardedBlock>,
    pub received_packets: u64,
    pub received_bytes: u64,
}

impl ReceiverReport {
    /// Wraps the report for the sender, echoing the last sender-report time.
    pub fn to_summary(&self, lsr: u32, dlsr: u32) -> ReportSummary {
        ReportSummary {
            path_id: self.path_id,
            receiver_report: Some(ReceiverReportBlock {
                fraction_lost: self.fraction_lost,
                cumulative_lost: self.cumulative_lost,
                highest_seq: self.ext_highest_seq,
                jitter: self.jitter,
                lsr,
                dlsr,
            }),
            owd: self.owd,
            discarded: self.discarded,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SeqTracking {
    base: u16,
    highest: u16,
    cycles: u16,
}

impl SeqTracking {
    fn ext_highest(&self) -> u32 {
        ((self.cycles as u32) << 16) | self.highest as u32
    }

    fn expected(&self) -> u64 {
        (self.ext_highest() - self.base as u32) as u64 + 1
    }
}

/// Accumulates what a receiver observed on one subflow between reports.
pub struct ReceiverStats<T: TimeSource = RealTime> {
    path_id: u8,
    seq: Option<SeqTracking>,
    received_packets: u64,
    received_bytes: u64,
    expected_prior: u64,
    received_prior: u64,
    /// Smoothed interarrival jitter in nanoseconds.
    jitter: f64,
    last_transit: Option<i64>,
    owd: SlidingWindow<u64, T>,
    owd_stats: LatestValue<PercentileStats<u64>>,
    discarded: DiscardedBlock,
    reported_discarded: DiscardedBlock,
}

impl ReceiverStats<RealTime> {
    pub fn new(path_id: u8, config: &ReceiverConfig) -> Self {
        Self::new_with_time_source(path_id, config, RealTime::new())
    }
}

impl<T: TimeSource> ReceiverStats<T> {
    pub fn new_with_time_source(path_id: u8, config: &ReceiverConfig, time_source: T) -> Self {
        let owd_stats = LatestValue::new(PercentileStats::default());
        let mut owd = SlidingWindow::new_with_time_source(
            config.owd_window_capacity,
            Some(config.owd_window()),
            time_source,
        );
        owd.add_plugin(
            Percentile::new(config.owd_percentile, |delay: &u64| *delay)
                .with_listener(owd_stats.recorder()),
        );
        Self {
            path_id,
            seq: None,
            received_packets: 0,
            received_bytes: 0,
            expected_prior: 0,
            received_prior: 0,
            jitter: 0.0,
            last_transit: None,
            owd,
            owd_stats,
            discarded: DiscardedBlock::default(),
            reported_discarded: DiscardedBlock::default(),
        }
    }

    pub fn path_id(&self) -> u8 {
        self.path_id
    }

    /// Records a packet arrival. `sent_at` and `arrived_at` are nanoseconds on
    /// clocks assumed to be synchronised.
    pub fn on_packet_received(&mut self, subflow_seq: u16, payload_size: usize, sent_at: u64, arrived_at: u64) {
        self.update_seq(subflow_seq);
        self.received_packets += 1;
        self.received_bytes += payload_size as u64;

        let transit = arrived_at as i64 - sent_at as i64;
        if let Some(last) = self.last_transit {
            let d = (transit - last).unsigned_abs() as f64;
            self.jitter += (d - self.jitter) / 16.0;
        }
        self.last_transit = Some(transit);
        self.owd.add(transit.max(0) as u64);
    }

    /// Records a packet dropped by the receiver's playout buffer.
    pub fn on_packet_discarded(&mut self, payload_size: usize) {
        self.discarded.bytes += payload_size as u64;
        self.discarded.packets += 1;
    }

    fn update_seq(&mut self, seq: u16) {
        let Some(tracking) = self.seq.as_mut() else {
            self.seq = Some(SeqTracking {
                base: seq,
                highest: seq,
                cycles: 0,
            });
            return;
        };
        let delta = seq.wrapping_sub(tracking.highest);
        if delta == 0 || delta >= SEQ_HALF_RANGE {
            // Duplicate or reordered.
            return;
        }
        if seq < tracking.highest {
            tracking.cycles = tracking.cycles.wrapping_add(1);
        }
        tracking.highest = seq;
    }

    /// Builds a report and starts a new reporting interval. `None` until the
    /// first packet arrived.
    pub fn produce_report(&mut self) -> Option<ReceiverReport> {
        let tracking = self.seq?;
        let expected = tracking.expected();
        let expected_interval = expected.saturating_sub(self.expected_prior);
        let received_interval = self.received_packets - self.received_prior;
        let lost_interval = expected_interval as i64 - received_interval as i64;
        self.expected_prior = expected;
        self.received_prior = self.received_packets;

        let fraction_lost = if expected_interval == 0 || lost_interval <= 0 {
            0
        } else {
            ((lost_interval as u64) << 8) / expected_interval
        };
        let cumulative_lost = expected.saturating_sub(self.received_packets);

        self.owd.refresh();
        let owd = self.owd_stats.get();
        let owd = match (owd.min, owd.max) {
            (Some(min), Some(max)) => Some(OwdBlock {
                median: Duration::from_nanos(owd.value.unwrap_or(min)),
                min: Duration::from_nanos(min),
                max: Duration::from_nanos(max),
            }),
            _ => None,
        };

        let discarded = (self.discarded != self.reported_discarded).then_some(self.discarded);
        self.reported_discarded = self.discarded;

        let report = ReceiverReport {
            path_id: self.path_id,
            fraction_lost: fraction_lost.min(u8::MAX as u64) as u8,
            cumulative_lost: cumulative_lost.min(u32::MAX as u64) as u32,
            ext_highest_seq: tracking.ext_highest(),
            jitter: Duration::from_nanos(self.jitter.round() as u64),
            owd,
            discarded,
            received_packets: self.received_packets,
            received_bytes: self.received_bytes,
        };
        tracing::trace!(
            path_id = self.path_id,
            fraction_lost = report.fraction_lost,
            cumulative_lost = report.cumulative_lost,
            ext_highest_seq = report.ext_highest_seq,
            "Produced receiver report"
        );
        Some(report)
    }
}

impl<T: TimeSource> std::fmt::Debug for ReceiverStats<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverStats")
            .field("path_id", &self.path_id)
            .field("received_packets", &self.received_packets)
            .field("jitter", &self.jitter)
            .finish()
    }
}
