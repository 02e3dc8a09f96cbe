//! Bytes-in-flight and recent throughput per path.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::stats::{LatestValue, SlidingWindow, Sum};
use crate::time::{RealTime, TimeSource};

/// Item capacity of the sent and acked throughput windows.
pub(crate) const THROUGHPUT_WINDOW_CAPACITY: usize = 1000;

/// Horizon of the sent and acked throughput windows.
pub(crate) const THROUGHPUT_HORIZON: Duration = Duration::from_secs(1);

/// Send-side counters of one path, or of all paths together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SendTrackerStats {
    pub bytes_in_flight: u64,
    pub packets_in_flight: u64,
    pub sent_bytes_in_1s: u64,
    pub sent_packets_in_1s: u64,
    pub acked_bytes_in_1s: u64,
    pub acked_packets_in_1s: u64,
    pub total_sent_bytes: u64,
    pub total_sent_packets: u64,
    pub total_acked_bytes: u64,
    pub total_acked_packets: u64,
    pub total_lost_bytes: u64,
    pub total_lost_packets: u64,
}

impl SendTrackerStats {
    fn accumulate(&mut self, other: &SendTrackerStats) {
        self.bytes_in_flight += other.bytes_in_flight;
        self.packets_in_flight += other.packets_in_flight;
        self.sent_bytes_in_1s += other.sent_bytes_in_1s;
        self.sent_packets_in_1s += other.sent_packets_in_1s;
        self.acked_bytes_in_1s += other.acked_bytes_in_1s;
        self.acked_packets_in_1s += other.acked_packets_in_1s;
        self.total_sent_bytes += other.total_sent_bytes;
        self.total_sent_packets += other.total_sent_packets;
        self.total_acked_bytes += other.total_acked_bytes;
        self.total_acked_packets += other.total_acked_packets;
        self.total_lost_bytes += other.total_lost_bytes;
        self.total_lost_packets += other.total_lost_packets;
    }
}

/// Bytes and packet count over the last second.
struct Throughput<T: TimeSource> {
    window: SlidingWindow<usize, T>,
    bytes: LatestValue<f64>,
    packets: LatestValue<f64>,
}

impl<T: TimeSource> Throughput<T> {
    fn new(time_source: T) -> Self {
        let bytes = LatestValue::new(0.0);
        let packets = LatestValue::new(0.0);
        let mut window = SlidingWindow::new_with_time_source(
            THROUGHPUT_WINDOW_CAPACITY,
            Some(THROUGHPUT_HORIZON),
            time_source,
        );
        window.add_plugin(Sum::new(|size: &usize| *size as f64).with_listener(bytes.recorder()));
        window.add_plugin(Sum::new(|_: &usize| 1.0).with_listener(packets.recorder()));
        Self {
            window,
            bytes,
            packets,
        }
    }

    fn add(&mut self, size: usize) {
        self.window.add(size);
    }

    fn refresh(&mut self) {
        self.window.refresh();
    }

    fn bytes(&self) -> u64 {
        self.bytes.get().max(0.0).round() as u64
    }

    fn packets(&self) -> u64 {
        self.packets.get().max(0.0).round() as u64
    }
}

struct PathTracking<T: TimeSource> {
    in_flight: BTreeMap<u16, usize>,
    sent: Throughput<T>,
    acked: Throughput<T>,
    stats: SendTrackerStats,
}

impl<T: TimeSource> PathTracking<T> {
    fn new(time_source: T) -> Self {
        Self {
            in_flight: BTreeMap::new(),
            sent: Throughput::new(time_source.clone()),
            acked: Throughput::new(time_source),
            stats: SendTrackerStats::default(),
        }
    }

    fn snapshot(&self) -> SendTrackerStats {
        SendTrackerStats {
            bytes_in_flight: self.in_flight.values().map(|size| *size as u64).sum(),
            packets_in_flight: self.in_flight.len() as u64,
            sent_bytes_in_1s: self.sent.bytes(),
            sent_packets_in_1s: self.sent.packets(),
            acked_bytes_in_1s: self.acked.bytes(),
            acked_packets_in_1s: self.acked.packets(),
            ..self.stats
        }
    }

    fn lose(&mut self, size: usize) {
        self.stats.total_lost_bytes += size as u64;
        self.stats.total_lost_packets += 1;
    }
}

/// Tracks what each path has in flight and how much it sent and got
/// acknowledged over the last second.
pub struct SendTracker<T: TimeSource = RealTime> {
    paths: BTreeMap<u8, PathTracking<T>>,
    time_source: T,
}

impl SendTracker<RealTime> {
    pub fn new() -> Self {
        Self::new_with_time_source(RealTime::new())
    }
}

impl Default for SendTracker<RealTime> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeSource> SendTracker<T> {
    pub fn new_with_time_source(time_source: T) -> Self {
        Self {
            paths: BTreeMap::new(),
            time_source,
        }
    }

    pub fn on_packet_sent(&mut self, path_id: u8, subflow_seq: u16, size: usize) {
        let time_source = &self.time_source;
        let path = self
            .paths
            .entry(path_id)
            .or_insert_with(|| PathTracking::new(time_source.clone()));
        if let Some(stale) = path.in_flight.insert(subflow_seq, size) {
            // The sequence space wrapped before the previous packet was acked.
            tracing::trace!(path_id, subflow_seq, "In-flight entry replaced, counting as lost");
            path.lose(stale);
        }
        path.sent.add(size);
        path.stats.total_sent_bytes += size as u64;
        path.stats.total_sent_packets += 1;
    }

    pub fn on_packet_acked(&mut self, path_id: u8, subflow_seq: u16) {
        let Some(path) = self.paths.get_mut(&path_id) else {
            tracing::trace!(path_id, subflow_seq, "Ack for untracked path");
            return;
        };
        let Some(size) = path.in_flight.remove(&subflow_seq) else {
            tracing::trace!(path_id, subflow_seq, "Ack for packet not in flight");
            return;
        };
        path.acked.add(size);
        path.stats.total_acked_bytes += size as u64;
        path.stats.total_acked_packets += 1;
    }

    pub fn on_packet_lost(&mut self, path_id: u8, subflow_seq: u16) {
        let Some(path) = self.paths.get_mut(&path_id) else {
            return;
        };
        match path.in_flight.remove(&subflow_seq) {
            Some(size) => path.lose(size),
            None => tracing::trace!(path_id, subflow_seq, "Loss for packet not in flight"),
        }
    }

    /// Evicts throughput samples older than one second.
    pub fn refresh(&mut self) {
        for path in self.paths.values_mut() {
            path.sent.refresh();
            path.acked.refresh();
        }
    }

    /// Forgets a detached path.
    pub fn remove_path(&mut self, path_id: u8) {
        self.paths.remove(&path_id);
    }

    pub fn stats(&self, path_id: u8) -> Option<SendTrackerStats> {
        self.paths.get(&path_id).map(PathTracking::snapshot)
    }

    /// Counters summed over every path.
    pub fn total(&self) -> SendTrackerStats {
        let mut total = SendTrackerStats::default();
        for path in self.paths.values() {
            total.accumulate(&path.snapshot());
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::VirtualTime;

    fn tracker() -> (SendTracker<VirtualTime>, VirtualTime) {
        let time = VirtualTime::new();
        (SendTracker::new_with_time_source(time.clone()), time)
    }

    #[test]
    fn test_in_flight_follows_acks_and_losses() {
        let (mut tracker, _time) = tracker();
        for seq in 1..=4 {
            tracker.on_packet_sent(1, seq, 1000);
        }
        tracker.on_packet_acked(1, 2);
        tracker.on_packet_lost(1, 3);

        let stats = tracker.stats(1).unwrap();
        assert_eq!(stats.packets_in_flight, 2);
        assert_eq!(stats.bytes_in_flight, 2000);
        assert_eq!(stats.total_sent_packets, 4);
        assert_eq!(stats.total_acked_bytes, 1000);
        assert_eq!(stats.total_lost_packets, 1);
        assert_eq!(stats.acked_packets_in_1s, 1);
    }

    #[test_log::test]
    fn test_unknown_ack_is_ignored() {
        let (mut tracker, _time) = tracker();
        tracker.on_packet_acked(7, 1);
        assert!(tracker.stats(7).is_none());

        tracker.on_packet_sent(1, 10, 500);
        tracker.on_packet_acked(1, 11);
        tracker.on_packet_acked(1, 10);
        tracker.on_packet_acked(1, 10);
        assert_eq!(tracker.stats(1).unwrap().total_acked_packets, 1);
    }

    #[test]
    fn test_throughput_expires_after_one_second() {
        let (mut tracker, time) = tracker();
        tracker.on_packet_sent(1, 1, 300);
        time.advance(Duration::from_millis(600));
        tracker.on_packet_sent(1, 2, 200);
        assert_eq!(tracker.stats(1).unwrap().sent_bytes_in_1s, 500);

        time.advance(Duration::from_millis(500));
        tracker.refresh();
        let stats = tracker.stats(1).unwrap();
        assert_eq!(stats.sent_bytes_in_1s, 200);
        assert_eq!(stats.sent_packets_in_1s, 1);
        assert_eq!(stats.total_sent_bytes, 500);
    }

    #[test]
    fn test_replaced_entry_counts_as_lost() {
        let (mut tracker, _time) = tracker();
        tracker.on_packet_sent(1, 5, 100);
        tracker.on_packet_sent(1, 5, 120);
        let stats = tracker.stats(1).unwrap();
        assert_eq!(stats.packets_in_flight, 1);
        assert_eq!(stats.bytes_in_flight, 120);
        assert_eq!(stats.total_lost_bytes, 100);
    }

    #[test]
    fn test_total_sums_paths() {
        let (mut tracker, _time) = tracker();
        tracker.on_packet_sent(1, 1, 100);
        tracker.on_packet_sent(2, 1, 250);
        let total = tracker.total();
        assert_eq!(total.bytes_in_flight, 350);
        assert_eq!(total.total_sent_packets, 2);

        tracker.remove_path(2);
        assert_eq!(tracker.total().bytes_in_flight, 100);
    }
}
